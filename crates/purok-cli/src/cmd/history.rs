//! `purok history <id>`: every status event for a report id, oldest first.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use purok_core::{ReportId, StatusEvent};
use serde::Serialize;

use super::CmdContext;
use crate::output::{Renderable, local_time, render_list};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Report id. Archived and removed ids keep their history.
    pub id: ReportId,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct EventRow(StatusEvent);

impl Renderable for EventRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let event = &self.0;
        write!(
            w,
            "#{:<4} {}  {:<11}  by {}",
            event.sequence,
            local_time(event.updated_at),
            event.status.label(),
            event.updated_by.as_deref().unwrap_or("-")
        )?;
        if let Some(ref response) = event.official_response {
            write!(w, "  \"{response}\"")?;
        }
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let event = &self.0;
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            event.sequence,
            event.status.as_str(),
            event.updated_by.as_deref().unwrap_or("-"),
            event.official_response.as_deref().unwrap_or("-")
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["sequence", "status", "by", "response"]
    }
}

pub async fn run_history(args: &HistoryArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let rows: Vec<EventRow> = tracker
        .status_log()
        .history(&args.id)
        .await?
        .into_iter()
        .map(EventRow)
        .collect();

    if rows.is_empty() && !ctx.output.is_json() {
        println!("No status events recorded for {}", args.id);
        return Ok(());
    }
    render_list(&rows, ctx.output)
}
