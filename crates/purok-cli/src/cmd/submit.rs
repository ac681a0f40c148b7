//! `purok submit`: file a new report as the current actor.

use anyhow::Result;
use clap::Args;
use purok_core::{AttachmentInput, ReportDraft};

use super::CmdContext;
use super::list::ReportRow;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Short summary of the issue.
    #[arg(long)]
    pub title: String,

    /// What is wrong and where exactly.
    #[arg(short, long)]
    pub description: String,

    /// Free-text location, e.g. "Purok 3".
    #[arg(short, long)]
    pub location: Option<String>,

    /// Attachment URI (repeatable).
    #[arg(short, long = "attachment", value_name = "URI")]
    pub attachments: Vec<String>,

    /// Attachments as a JSON-encoded list, as older clients send them.
    #[arg(long, value_name = "JSON", conflicts_with = "attachments")]
    pub attachments_json: Option<String>,
}

impl SubmitArgs {
    fn draft(&self) -> ReportDraft {
        let attachments = self.attachments_json.as_ref().map_or_else(
            || AttachmentInput::List(self.attachments.clone()),
            |raw| AttachmentInput::Raw(raw.clone()),
        );
        let mut draft =
            ReportDraft::new(&self.title, &self.description).with_attachments(attachments);
        if let Some(ref location) = self.location {
            draft = draft.with_location(location);
        }
        draft
    }
}

pub async fn run_submit(args: &SubmitArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;

    let id = session.submit(args.draft()).await?;
    let report = tracker.reports().get(&id).await?;
    let row = ReportRow::from_report(&tracker, report).await;

    render_mode(
        ctx.output,
        &row,
        |r, w| writeln!(w, "{}", r.id),
        |r, w| {
            writeln!(w, "✓ Submitted {}", r.id)?;
            pretty_kv(w, "Title", &r.title)?;
            pretty_kv(w, "Status", r.status.label())?;
            if let Some(ref location) = r.location {
                pretty_kv(w, "Location", location)?;
            }
            Ok(())
        },
    )
}
