//! `purok watch`: keep a synced snapshot and print a summary when it changes.
//!
//! Other processes share only the database, so the command feeds its own
//! notifier on a timer. The sync client coalesces those ticks with any local
//! signals and resyncs.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use purok_core::{Status, SyncSnapshot, Topic};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::CmdContext;
use crate::output::{OutputMode, local_time};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// How often to check the database for changes.
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub interval_ms: u64,

    /// Exit after printing this many snapshots.
    #[arg(long)]
    pub count: Option<u64>,
}

/// One printed line of `purok watch`.
#[derive(Debug, PartialEq, Eq, Serialize)]
struct WatchSummary {
    generation: u64,
    active: usize,
    pending: usize,
    in_progress: usize,
    resolved: usize,
    archived: usize,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    synced_at: Option<DateTime<Utc>>,
}

impl WatchSummary {
    fn from_snapshot(snapshot: &SyncSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            active: snapshot.reports.len(),
            pending: snapshot.count_by_status(Status::Pending),
            in_progress: snapshot.count_by_status(Status::InProgress),
            resolved: snapshot.count_by_status(Status::Resolved),
            archived: snapshot.archived.len(),
            stale: snapshot.stale,
            synced_at: snapshot.synced_at,
        }
    }

    fn line(&self, mode: OutputMode) -> Result<String> {
        let stale = if self.stale { " (stale)" } else { "" };
        Ok(match mode {
            OutputMode::Json => serde_json::to_string(self)?,
            OutputMode::Text => format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.generation,
                self.active,
                self.pending,
                self.in_progress,
                self.resolved,
                self.archived,
                self.stale
            ),
            OutputMode::Pretty => format!(
                "[{}] {} active ({} pending, {} in progress, {} resolved), {} archived{stale}",
                self.synced_at.map_or_else(|| "never".to_string(), local_time),
                self.active,
                self.pending,
                self.in_progress,
                self.resolved,
                self.archived,
            ),
        })
    }

    /// Whether the visible data differs, ignoring bookkeeping fields.
    fn differs(&self, other: &Self) -> bool {
        (
            self.active,
            self.pending,
            self.in_progress,
            self.resolved,
            self.archived,
            self.stale,
        ) != (
            other.active,
            other.pending,
            other.in_progress,
            other.resolved,
            other.archived,
            other.stale,
        )
    }
}

pub async fn run_watch(args: &WatchArgs, ctx: &CmdContext) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    let client = tracker.sync_client().await;
    let mut updates = client.watch();

    let mut last = WatchSummary::from_snapshot(&updates.borrow_and_update());
    println!("{}", last.line(ctx.output)?);
    let mut printed = 1_u64;

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    while args.count.is_none_or(|count| printed < count) {
        tokio::select! {
            _ = ticker.tick() => {
                tracker.notifier().publish(Topic::Reports);
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = WatchSummary::from_snapshot(&updates.borrow_and_update());
                if summary.differs(&last) {
                    println!("{}", summary.line(ctx.output)?);
                    printed += 1;
                }
                last = summary;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
