//! Persistence seam under the report, status-log and archive stores.
//!
//! A [`Backend`] is the single authoritative store. It owns exactly three
//! responsibilities the stores cannot do themselves:
//! - assign strictly increasing status-event sequences
//! - check report existence atomically with an append
//! - return listings in their canonical order
//!
//! Everything else (validation, policy, notification, compensation) lives in
//! [`crate::store`], so every backend behaves the same.

pub mod fault;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ArchiveId, ArchiveRecord, NewStatusEvent, Report, ReportId, StatusEvent};

pub use fault::{BackendOp, FaultyBackend};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Outcome of ingesting an event that already carries a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event was new and is now part of the history.
    Inserted,
    /// An identical event was already present; nothing changed.
    Duplicate,
}

/// Durable storage for reports, status events and archive records.
///
/// Implementations must be `Send + Sync + 'static` so stores can share them
/// across tasks behind an `Arc`.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    // ── Reports ──────────────────────────────────────────────────────────────

    /// Insert a new active report. Fails with `InvalidInput` if the id exists.
    async fn insert_report(&self, report: &Report) -> Result<()>;

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>>;

    /// All active reports, `created_at` descending then id ascending.
    async fn list_reports(&self) -> Result<Vec<Report>>;

    /// Delete an active report. Returns `false` if it was not present.
    async fn delete_report(&self, id: &ReportId) -> Result<bool>;

    /// Refresh the cached status fields from `event` if it is newer than the
    /// sequence they were last refreshed from. Returns whether a write happened.
    async fn refresh_cached_status(&self, event: &StatusEvent) -> Result<bool>;

    // ── Status log ───────────────────────────────────────────────────────────

    /// Append an event, assigning the next sequence.
    ///
    /// Fails with `NotFound` if the report is not active at append time.
    async fn append_event(&self, event: NewStatusEvent) -> Result<StatusEvent>;

    /// Insert an event whose sequence was assigned upstream.
    async fn ingest_event(&self, event: &StatusEvent) -> Result<IngestOutcome>;

    /// Full history for a report, sequence ascending.
    async fn events_for(&self, id: &ReportId) -> Result<Vec<StatusEvent>>;

    async fn latest_event(&self, id: &ReportId) -> Result<Option<StatusEvent>>;

    /// Latest event per id in one round trip. Ids without history are absent.
    async fn latest_events(&self, ids: &[ReportId]) -> Result<HashMap<ReportId, StatusEvent>>;

    // ── Archive ──────────────────────────────────────────────────────────────

    async fn insert_archive(&self, record: &ArchiveRecord) -> Result<()>;

    async fn get_archive(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>>;

    /// All archive records, `archived_at` descending then id ascending.
    async fn list_archives(&self) -> Result<Vec<ArchiveRecord>>;

    /// Delete an archive record. Returns `false` if it was not present.
    async fn delete_archive(&self, id: &ArchiveId) -> Result<bool>;
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Backend")
    }
}

pub(crate) fn sort_reports(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

pub(crate) fn sort_archives(records: &mut [ArchiveRecord]) {
    records.sort_by(|a, b| {
        b.archived_at
            .cmp(&a.archived_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
