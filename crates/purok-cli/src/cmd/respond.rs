//! `purok respond` and `purok resolve`: officials appending status events.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use purok_core::{ReportId, StatusEvent};

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct RespondArgs {
    /// Report to respond to.
    pub id: ReportId,

    /// Response shown to the resident.
    pub response: String,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Report to resolve.
    pub id: ReportId,

    /// Closing response shown to the resident.
    #[arg(short, long)]
    pub response: Option<String>,
}

fn render_event(ctx: &CmdContext, event: &StatusEvent) -> Result<()> {
    render_mode(
        ctx.output,
        event,
        |e, w| writeln!(w, "{}\t{}\t{}", e.report_id, e.sequence, e.status.as_str()),
        pretty_event,
    )
}

fn pretty_event(event: &StatusEvent, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "✓ {} is now {} (#{})",
        event.report_id,
        event.status.label(),
        event.sequence
    )?;
    if let Some(ref response) = event.official_response {
        pretty_kv(w, "Response", response)?;
    }
    Ok(())
}

pub async fn run_respond(args: &RespondArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;
    let event = session.respond(&args.id, &args.response).await?;
    render_event(ctx, &event)
}

pub async fn run_resolve(args: &ResolveArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let session = ctx.session(&tracker)?;
    let event = session.resolve(&args.id, args.response.as_deref()).await?;
    render_event(ctx, &event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ResolveArgs,
    }

    #[test]
    fn resolve_response_is_optional() {
        let w = Wrapper::parse_from(["test", "rp-abc123"]);
        assert_eq!(w.args.id.as_str(), "rp-abc123");
        assert!(w.args.response.is_none());
    }

    #[test]
    fn malformed_id_is_rejected() {
        assert!(Wrapper::try_parse_from(["test", "ar-abc123"]).is_err());
    }
}
