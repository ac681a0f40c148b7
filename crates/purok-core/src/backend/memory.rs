//! In-process backend. Used by tests and by embedders that do not need
//! durability across restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Backend, IngestOutcome, sort_archives, sort_reports};
use crate::error::{Result, StoreError};
use crate::model::{
    ArchiveId, ArchiveRecord, EventId, NewStatusEvent, Report, ReportId, StatusEvent,
};

#[derive(Debug, Default)]
struct State {
    reports: HashMap<ReportId, Report>,
    /// Per-report history, kept sorted by sequence.
    events: HashMap<ReportId, Vec<StatusEvent>>,
    /// Every sequence ever issued or ingested.
    sequences: HashMap<u64, ReportId>,
    last_sequence: u64,
    archives: HashMap<ArchiveId, ArchiveRecord>,
}

impl State {
    fn insert_event(&mut self, event: StatusEvent) {
        self.sequences.insert(event.sequence, event.report_id.clone());
        self.last_sequence = self.last_sequence.max(event.sequence);
        let history = self.events.entry(event.report_id.clone()).or_default();
        let at = history.partition_point(|e| e.sequence < event.sequence);
        history.insert(at, event);
    }

    fn find_event(&self, report_id: &ReportId, pred: impl Fn(&StatusEvent) -> bool) -> Option<&StatusEvent> {
        self.events.get(report_id)?.iter().find(|e| pred(e))
    }
}

/// Backend holding everything in memory behind one async mutex.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_report(&self, report: &Report) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.reports.contains_key(&report.id) {
            return Err(StoreError::invalid(
                "report id",
                format!("{} already exists", report.id),
            ));
        }
        state.reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        Ok(self.state.lock().await.reports.get(id).cloned())
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = self.state.lock().await.reports.values().cloned().collect();
        sort_reports(&mut reports);
        Ok(reports)
    }

    async fn delete_report(&self, id: &ReportId) -> Result<bool> {
        Ok(self.state.lock().await.reports.remove(id).is_some())
    }

    async fn refresh_cached_status(&self, event: &StatusEvent) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(report) = state.reports.get_mut(&event.report_id) else {
            return Ok(false);
        };
        if event.sequence <= report.status_sequence {
            return Ok(false);
        }
        report.status = event.status;
        report.official_response.clone_from(&event.official_response);
        report.status_sequence = event.sequence;
        Ok(true)
    }

    async fn append_event(&self, event: NewStatusEvent) -> Result<StatusEvent> {
        let mut state = self.state.lock().await;
        if !state.reports.contains_key(&event.report_id) {
            return Err(StoreError::report_not_found(&event.report_id));
        }
        let sequence = state.last_sequence + 1;
        let event = event.assign(EventId::generate(), sequence);
        state.insert_event(event.clone());
        Ok(event)
    }

    async fn ingest_event(&self, event: &StatusEvent) -> Result<IngestOutcome> {
        let event = event.clone().at_store_precision();
        let mut state = self.state.lock().await;
        if !state.reports.contains_key(&event.report_id) {
            return Err(StoreError::report_not_found(&event.report_id));
        }

        if let Some(owner) = state.sequences.get(&event.sequence).cloned() {
            let same = state
                .find_event(&owner, |e| e.sequence == event.sequence)
                .is_some_and(|existing| *existing == event);
            return if same {
                Ok(IngestOutcome::Duplicate)
            } else {
                Err(StoreError::invalid(
                    "sequence",
                    format!("{} is already taken by another event", event.sequence),
                ))
            };
        }

        if state.find_event(&event.report_id, |e| e.id == event.id).is_some() {
            return Err(StoreError::invalid(
                "event id",
                format!("{} already exists with a different sequence", event.id),
            ));
        }

        state.insert_event(event);
        Ok(IngestOutcome::Inserted)
    }

    async fn events_for(&self, id: &ReportId) -> Result<Vec<StatusEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_event(&self, id: &ReportId) -> Result<Option<StatusEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .get(id)
            .and_then(|history| history.last().cloned()))
    }

    async fn latest_events(&self, ids: &[ReportId]) -> Result<HashMap<ReportId, StatusEvent>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let latest = state.events.get(id)?.last()?;
                Some((id.clone(), latest.clone()))
            })
            .collect())
    }

    async fn insert_archive(&self, record: &ArchiveRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.archives.contains_key(&record.id) {
            return Err(StoreError::invalid(
                "archive id",
                format!("{} already exists", record.id),
            ));
        }
        state.archives.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_archive(&self, id: &ArchiveId) -> Result<Option<ArchiveRecord>> {
        Ok(self.state.lock().await.archives.get(id).cloned())
    }

    async fn list_archives(&self) -> Result<Vec<ArchiveRecord>> {
        let mut records: Vec<ArchiveRecord> =
            self.state.lock().await.archives.values().cloned().collect();
        sort_archives(&mut records);
        Ok(records)
    }

    async fn delete_archive(&self, id: &ArchiveId) -> Result<bool> {
        Ok(self.state.lock().await.archives.remove(id).is_some())
    }
}

impl MemoryBackend {
    /// Number of events ever stored for `id`, including orphaned history.
    pub async fn history_len(&self, id: &ReportId) -> usize {
        self.state.lock().await.events.get(id).map_or(0, Vec::len)
    }
}
