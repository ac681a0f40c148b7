//! Per-actor session handle.
//!
//! A session carries the actor identity into every call and keeps a
//! client-local in-flight set: while an action on a report is running, a
//! second action on the same report from the same session is refused with
//! [`StoreError::InFlight`]. Different sessions never block each other.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::IngestOutcome;
use crate::error::{Result, StoreError};
use crate::model::{
    Actor, AppendRequest, ArchiveId, ArchiveRecord, Report, ReportDraft, ReportId, Status,
    StatusEvent,
};
use crate::tracker::Tracker;

#[derive(Debug, Clone)]
pub struct Session {
    tracker: Tracker,
    actor: Actor,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Marks one id as processing until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Session {
    pub(crate) fn new(tracker: Tracker, actor: Actor) -> Self {
        Self {
            tracker,
            actor,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub const fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Whether an action on `id` is currently running in this session.
    #[must_use]
    pub fn is_processing(&self, id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn begin(&self, key: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(key.to_string()) {
            tracing::debug!(id = key, actor = %self.actor.id, "refusing duplicate in-flight action");
            return Err(StoreError::InFlight(key.to_string()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key: key.to_string(),
        })
    }

    /// # Errors
    ///
    /// See [`ReportStore::submit`](crate::store::ReportStore::submit).
    pub async fn submit(&self, draft: ReportDraft) -> Result<ReportId> {
        self.tracker.reports().submit(&self.actor, draft).await
    }

    /// Append an arbitrary status event.
    ///
    /// # Errors
    ///
    /// [`StoreError::InFlight`] if this session is already acting on the
    /// report, otherwise see
    /// [`StatusLog::append_event`](crate::store::StatusLog::append_event).
    pub async fn update_status(&self, request: AppendRequest) -> Result<StatusEvent> {
        let _guard = self.begin(request.report_id.as_str())?;
        self.tracker
            .status_log()
            .append_event(&self.actor, request)
            .await
    }

    /// Mark a report in progress with a response for the resident.
    ///
    /// # Errors
    ///
    /// See [`Session::update_status`].
    pub async fn respond(&self, id: &ReportId, response: &str) -> Result<StatusEvent> {
        self.update_status(AppendRequest::new(id.clone(), Status::InProgress).with_response(response))
            .await
    }

    /// Mark a report resolved, optionally with a closing response.
    ///
    /// # Errors
    ///
    /// See [`Session::update_status`].
    pub async fn resolve(&self, id: &ReportId, response: Option<&str>) -> Result<StatusEvent> {
        let mut request = AppendRequest::new(id.clone(), Status::Resolved);
        if let Some(response) = response {
            request = request.with_response(response);
        }
        self.update_status(request).await
    }

    /// # Errors
    ///
    /// [`StoreError::InFlight`] or see
    /// [`ArchiveStore::archive`](crate::store::ArchiveStore::archive).
    pub async fn archive(&self, id: &ReportId) -> Result<ArchiveRecord> {
        let _guard = self.begin(id.as_str())?;
        self.tracker.archive().archive(&self.actor, id).await
    }

    /// # Errors
    ///
    /// [`StoreError::InFlight`] or see
    /// [`ArchiveStore::restore`](crate::store::ArchiveStore::restore).
    pub async fn restore(&self, id: &ArchiveId) -> Result<Report> {
        let _guard = self.begin(id.as_str())?;
        self.tracker.archive().restore(&self.actor, id).await
    }

    /// # Errors
    ///
    /// [`StoreError::InFlight`] or see
    /// [`ReportStore::remove`](crate::store::ReportStore::remove).
    pub async fn remove(&self, id: &ReportId) -> Result<()> {
        let _guard = self.begin(id.as_str())?;
        self.tracker.reports().remove(&self.actor, id).await
    }

    /// Replicate an upstream event as this session's official. Not guarded
    /// by the in-flight set: ingestion is idempotent.
    ///
    /// # Errors
    ///
    /// See [`StatusLog::ingest`](crate::store::StatusLog::ingest).
    pub async fn ingest(&self, event: StatusEvent) -> Result<IngestOutcome> {
        self.tracker.status_log().ingest(&self.actor, event).await
    }

    /// The submitter's latest resolved report, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn latest_resolved(&self) -> Result<Option<(Report, StatusEvent)>> {
        self.tracker
            .status_log()
            .latest_resolved_for_submitter(&self.actor.id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    #[test]
    fn guard_releases_on_drop() {
        let tracker = Tracker::in_memory(TrackerConfig::default());
        let session = tracker.session(Actor::official("official-1"));

        let guard = session.begin("rp-aaaa").expect("first action");
        assert!(session.is_processing("rp-aaaa"));
        let err = session.begin("rp-aaaa").err().expect("second action refused");
        assert!(matches!(err, StoreError::InFlight(ref id) if id == "rp-aaaa"));
        assert!(session.begin("rp-bbbb").is_ok(), "other reports are unaffected");

        drop(guard);
        assert!(!session.is_processing("rp-aaaa"));
        assert!(session.begin("rp-aaaa").is_ok());
    }

    #[test]
    fn sessions_do_not_share_guards() {
        let tracker = Tracker::in_memory(TrackerConfig::default());
        let a = tracker.session(Actor::official("official-1"));
        let b = tracker.session(Actor::official("official-2"));

        let _held = a.begin("rp-aaaa").expect("a acts");
        assert!(b.begin("rp-aaaa").is_ok());
    }

    #[tokio::test]
    async fn concurrent_same_session_action_is_refused() {
        let tracker = Tracker::in_memory(TrackerConfig::default());
        let resident = tracker.session(Actor::resident("resident-1"));
        let id = resident
            .submit(ReportDraft::new("Overflowing bin", "Not collected for a week"))
            .await
            .expect("submit");

        let official = tracker.session(Actor::official("official-1"));
        let (first, second) = tokio::join!(
            official.respond(&id, "Scheduled for pickup"),
            official.respond(&id, "Scheduled for pickup")
        );

        let outcomes = [first.is_ok(), second.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let refused = first.err().or(second.err()).expect("one refused");
        assert!(matches!(refused, StoreError::InFlight(_)));
    }

    #[tokio::test]
    async fn only_official_sessions_ingest() {
        let tracker = Tracker::in_memory(TrackerConfig::default());
        let resident = tracker.session(Actor::resident("resident-1"));
        let id = resident
            .submit(ReportDraft::new("Stray dogs", "Near the plaza"))
            .await
            .expect("submit");
        let event = crate::model::NewStatusEvent {
            report_id: id.clone(),
            status: Status::Resolved,
            official_response: None,
            updated_by: Some("official-9".into()),
            location: None,
            updated_at: crate::model::now(),
        }
        .assign(crate::model::EventId::generate(), 4);

        let err = resident.ingest(event.clone()).await.expect_err("resident");
        assert!(matches!(err, StoreError::PermissionDenied { .. }));

        let official = tracker.session(Actor::official("official-1"));
        assert_eq!(official.ingest(event).await.expect("official"), IngestOutcome::Inserted);
    }
}
