use anyhow::Result;

use super::CmdContext;
use crate::output::render;

/// Run the store invariant checks and fail when any is violated.
///
/// # Errors
///
/// Returns an error when the store cannot be read or a violation is found.
pub async fn run_verify(ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let report = tracker.verify().await?;

    render(ctx.output, &report, |r, w| {
        writeln!(
            w,
            "checked {} reports, {} archive records, {} status events",
            r.reports_checked, r.archives_checked, r.events_checked
        )?;
        for violation in &r.violations {
            writeln!(w, "FAIL {violation}")?;
        }
        for id in &r.lagging_caches {
            writeln!(w, "NOTE {id} cached status lags the status log")?;
        }
        if r.is_ok() {
            writeln!(w, "verify: success")?;
        }
        Ok(())
    })?;

    if report.is_ok() {
        Ok(())
    } else {
        anyhow::bail!("verify: {} violation(s)", report.violations.len());
    }
}
