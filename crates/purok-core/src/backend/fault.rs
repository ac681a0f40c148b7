//! Fault-injecting [`Backend`] wrapper.
//!
//! Wraps any backend and fails selected operations with
//! [`StoreError::StoreUnavailable`], either for the next `n` calls or until
//! healed. Used to exercise retry, compensation and stale-cache paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Backend, IngestOutcome};
use crate::error::{Result, StoreError};
use crate::model::{ArchiveId, ArchiveRecord, NewStatusEvent, Report, ReportId, StatusEvent};

/// One backend operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    InsertReport,
    GetReport,
    ListReports,
    DeleteReport,
    RefreshCachedStatus,
    AppendEvent,
    IngestEvent,
    EventsFor,
    LatestEvent,
    LatestEvents,
    InsertArchive,
    GetArchive,
    ListArchives,
    DeleteArchive,
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Next(u32),
    Always,
}

#[derive(Debug, Default)]
struct Faults {
    plans: HashMap<BackendOp, Plan>,
    calls: HashMap<BackendOp, u64>,
}

impl Faults {
    /// Record a call and decide whether it should fail.
    fn trip(&mut self, op: BackendOp) -> bool {
        *self.calls.entry(op).or_default() += 1;
        match self.plans.get(&op).copied() {
            Some(Plan::Always) => true,
            Some(Plan::Next(n)) if n > 1 => {
                self.plans.insert(op, Plan::Next(n - 1));
                true
            }
            Some(Plan::Next(_)) => {
                self.plans.remove(&op);
                true
            }
            None => false,
        }
    }
}

/// Backend wrapper that can be told to fail.
#[derive(Debug)]
pub struct FaultyBackend {
    inner: Arc<dyn Backend>,
    faults: Mutex<Faults>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_next(&self, op: BackendOp, times: u32) {
        if times == 0 {
            return;
        }
        self.faults().plans.insert(op, Plan::Next(times));
    }

    /// Fail every call of `op` until [`heal`](Self::heal) is called.
    pub fn fail_always(&self, op: BackendOp) {
        self.faults().plans.insert(op, Plan::Always);
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        self.faults().plans.clear();
    }

    /// Number of times `op` was attempted, failed or not.
    pub fn calls(&self, op: BackendOp) -> u64 {
        self.faults().calls.get(&op).copied().unwrap_or(0)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: BackendOp) -> Result<()> {
        if self.faults().trip(op) {
            tracing::debug!(?op, "injected backend fault");
            Err(StoreError::unavailable(format!("injected fault on {op:?}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn insert_report(&self, report: &Report) -> Result<()> {
        self.check(BackendOp::InsertReport)?;
        self.inner.insert_report(report).await
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        self.check(BackendOp::GetReport)?;
        self.inner.get_report(id).await
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        self.check(BackendOp::ListReports)?;
        self.inner.list_reports().await
    }

    async fn delete_report(&self, id: &ReportId) -> Result<bool> {
        self.check(BackendOp::DeleteReport)?;
        self.inner.delete_report(id).await
    }

    async fn refresh_cached_status(&self, event: &StatusEvent) -> Result<bool> {
        self.check(BackendOp::RefreshCachedStatus)?;
        self.inner.refresh_cached_status(event).await
    }

    async fn append_event(&self, event: NewStatusEvent) -> Result<StatusEvent> {
        self.check(BackendOp::AppendEvent)?;
        self.inner.append_event(event).await
    }

    async fn ingest_event(&self, event: &StatusEvent) -> Result<IngestOutcome> {
        self.check(BackendOp::IngestEvent)?;
        self.inner.ingest_event(event).await
    }

    async fn events_for(&self, id: &ReportId) -> Result<Vec<StatusEvent>> {
        self.check(BackendOp::EventsFor)?;
        self.inner.events_for(id).await
    }

    async fn latest_event(&self, id: &ReportId) -> Result<Option<StatusEvent>> {
        self.check(BackendOp::LatestEvent)?;
        self.inner.latest_event(id).await
    }

    async fn latest_events(&self, ids: &[ReportId]) -> Result<HashMap<ReportId, StatusEvent>> {
        self.check(BackendOp::LatestEvents)?;
        self.inner.latest_events(ids).await
    }

    async fn insert_archive(&self, record: &ArchiveRecord) -> Result<()> {
        self.check(BackendOp::InsertArchive)?;
        self.inner.insert_archive(record).await
    }

    async fn get_archive(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        self.check(BackendOp::GetArchive)?;
        self.inner.get_archive(id).await
    }

    async fn list_archives(&self) -> Result<Vec<ArchiveRecord>> {
        self.check(BackendOp::ListArchives)?;
        self.inner.list_archives().await
    }

    async fn delete_archive(&self, id: &ArchiveId) -> Result<bool> {
        self.check(BackendOp::DeleteArchive)?;
        self.inner.delete_archive(id).await
    }
}
