//! `purok archive`, `purok restore` and `purok remove`.

use anyhow::Result;
use clap::Args;
use purok_core::{ArchiveId, ReportId};

use super::CmdContext;
use crate::output::{pretty_kv, render_mode, render_success};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Active report to archive.
    pub id: ReportId,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Archive record to restore.
    pub id: ArchiveId,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Active report to delete.
    pub id: ReportId,
}

/// Execute `purok archive <id>`. Prints the archive record.
pub async fn run_archive(args: &ArchiveArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;
    let record = session.archive(&args.id).await?;

    render_mode(
        ctx.output,
        &record,
        |r, w| writeln!(w, "{}", r.id),
        |r, w| {
            writeln!(w, "✓ Archived {} as {}", r.report_id, r.id)?;
            pretty_kv(w, "Status", r.status.label())?;
            if let Some(ref response) = r.official_response {
                pretty_kv(w, "Response", response)?;
            }
            Ok(())
        },
    )
}

/// Execute `purok restore <archive-id>`. Prints the new report; it has a new id.
pub async fn run_restore(args: &RestoreArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;
    let report = session.restore(&args.id).await?;

    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}", r.id),
        |r, w| {
            writeln!(w, "✓ Restored {} as {}", args.id, r.id)?;
            pretty_kv(w, "Status", r.status.label())?;
            if let Some(ref previous) = r.restored_from {
                pretty_kv(w, "Was", previous.as_str())?;
            }
            pretty_kv(w, "Location", r.location.as_deref().unwrap_or("-"))
        },
    )
}

/// Execute `purok remove <id>`.
pub async fn run_remove(args: &RemoveArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;
    session.remove(&args.id).await?;
    render_success(ctx.output, &format!("Removed {}", args.id))
}
