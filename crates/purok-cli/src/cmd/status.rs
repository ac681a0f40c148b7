//! `purok status [id]`.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use purok_core::{ReportId, StatusEvent};
use serde::Serialize;

use super::CmdContext;
use super::list::ReportRow;
use crate::output::{local_time, pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Report to show. Omit to show your most recently resolved report.
    pub id: Option<ReportId>,
}

#[derive(Debug, Serialize)]
struct LatestResolved {
    report: ReportRow,
    resolution: StatusEvent,
}

fn pretty_report(row: &ReportRow, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{}  {}", row.id, row.title))?;
    pretty_kv(w, "Status", row.status.label())?;
    if let Some(ref response) = row.official_response {
        pretty_kv(w, "Response", response)?;
    }
    pretty_kv(w, "Location", row.location.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "Submitter", &row.submitter)?;
    pretty_kv(w, "Filed", local_time(row.created_at))?;
    let source = row.sequence.map_or_else(
        || "cached status".to_string(),
        |sequence| format!("status log #{sequence}"),
    );
    pretty_kv(w, "From", source)?;
    if let Some(ref previous) = row.restored_from {
        pretty_kv(w, "Restored", format!("from {previous}"))?;
    }
    for uri in &row.attachments {
        pretty_kv(w, "Attachment", uri)?;
    }
    writeln!(w)?;
    writeln!(w, "{}", row.description)
}

pub async fn run_status(args: &StatusArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;

    if let Some(ref id) = args.id {
        let report = tracker.reports().get(id).await?;
        let row = ReportRow::from_report(&tracker, report).await;
        return render_mode(
            ctx.output,
            &row,
            |r, w| writeln!(w, "{}\t{}", r.id, r.status.as_str()),
            pretty_report,
        );
    }

    let session = ctx.session(&tracker)?;
    let mut latest = None;
    if let Some((report, resolution)) = session.latest_resolved().await? {
        latest = Some(LatestResolved {
            report: ReportRow::from_report(&tracker, report).await,
            resolution,
        });
    }

    render(ctx.output, &latest, |latest, w| {
        let Some(latest) = latest else {
            return writeln!(w, "No resolved reports for {}", session.actor().id);
        };
        writeln!(w, "Resolved {}:", local_time(latest.resolution.updated_at))?;
        pretty_report(&latest.report, w)
    })
}
