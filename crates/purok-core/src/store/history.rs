//! Append-only status history.
//!
//! The log is the single source of truth for status. Appends get a
//! backend-assigned sequence; "latest" always means highest sequence, never
//! newest timestamp. After an append the report's cached status fields are
//! refreshed best-effort, only moving forward in sequence.

use std::collections::HashMap;
use std::sync::Arc;

use super::{StoreContext, run_to_completion};
use crate::backend::IngestOutcome;
use crate::error::{Result, StoreError};
use crate::model::{
    self, Actor, AppendRequest, NewStatusEvent, Report, ReportId, Status, StatusEvent,
};
use crate::model::report::normalize_location;
use crate::notify::Topic;

#[derive(Debug, Clone)]
pub struct StatusLog {
    ctx: Arc<StoreContext>,
}

impl StatusLog {
    pub(crate) const fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// Append a status event on behalf of `actor`.
    ///
    /// The target status is checked against the report's current status as
    /// read from the log. Concurrent appends by different officials are all
    /// kept; none overwrites another.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] unless `actor` is an official
    /// - [`StoreError::InvalidInput`] for an `in_progress` event with no
    ///   response when the policy requires one
    /// - [`StoreError::NotFound`] if the report is not active
    /// - [`StoreError::InvalidTransition`] for regressions and post-resolution
    ///   edits the policy forbids
    pub async fn append_event(&self, actor: &Actor, request: AppendRequest) -> Result<StatusEvent> {
        actor.require_official("update report status")?;

        let response = request.normalized_response();
        if self.ctx.policy.require_progress_response
            && request.status == Status::InProgress
            && response.is_none()
        {
            return Err(StoreError::invalid(
                "official_response",
                "a response is required to mark a report in progress",
            ));
        }

        let ctx = Arc::clone(&self.ctx);
        let updated_by = actor.id.clone();
        run_to_completion("append status", async move {
            let report = ctx
                .bounded("get report", ctx.backend.get_report(&request.report_id))
                .await?
                .ok_or_else(|| StoreError::report_not_found(&request.report_id))?;

            let current = ctx
                .bounded("latest event", ctx.backend.latest_event(&report.id))
                .await?
                .map_or(report.status, |event| event.status);
            current.check_transition(request.status, ctx.policy)?;

            let new_event = NewStatusEvent {
                report_id: report.id.clone(),
                status: request.status,
                official_response: response,
                updated_by: Some(updated_by),
                location: normalize_location(request.location).or_else(|| report.location.clone()),
                updated_at: model::now(),
            };
            let event = ctx
                .bounded("append event", ctx.backend.append_event(new_event))
                .await?;
            tracing::info!(
                report = %event.report_id,
                sequence = event.sequence,
                from = %current,
                to = %event.status,
                "status appended"
            );

            refresh_cache(&ctx, &event).await;
            ctx.notifier.publish(Topic::Status);
            Ok(event)
        })
        .await
    }

    /// Insert an event whose sequence was assigned by the authoritative
    /// server, e.g. a redelivered or replicated event.
    ///
    /// Redelivering an identical event is a no-op. Arrival order does not
    /// matter: the latest event is always the one with the highest sequence.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] unless `actor` is an official
    /// - [`StoreError::NotFound`] if the report is not active
    /// - [`StoreError::InvalidInput`] if the sequence or event id is already
    ///   taken by a different event
    pub async fn ingest(&self, actor: &Actor, event: StatusEvent) -> Result<IngestOutcome> {
        actor.require_official("ingest status events")?;
        if event.sequence == 0 {
            return Err(StoreError::invalid("sequence", "must be positive"));
        }

        let ctx = Arc::clone(&self.ctx);
        run_to_completion("ingest status", async move {
            let outcome = ctx
                .bounded("ingest event", ctx.backend.ingest_event(&event))
                .await?;
            if outcome == IngestOutcome::Inserted {
                tracing::debug!(report = %event.report_id, sequence = event.sequence, "status ingested");
                refresh_cache(&ctx, &event).await;
                ctx.notifier.publish(Topic::Status);
            }
            Ok(outcome)
        })
        .await
    }

    /// The event with the highest sequence for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn latest_for(&self, id: &ReportId) -> Result<Option<StatusEvent>> {
        self.ctx
            .bounded("latest event", self.ctx.backend.latest_event(id))
            .await
    }

    /// Latest event per id in one backend round trip. Ids with no history
    /// are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn latest_for_batch(&self, ids: &[ReportId]) -> Result<HashMap<ReportId, StatusEvent>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.ctx
            .bounded("latest events", self.ctx.backend.latest_events(ids))
            .await
    }

    /// Full history for `id`, oldest sequence first. History outlives the
    /// report: it is still readable after archival or removal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn history(&self, id: &ReportId) -> Result<Vec<StatusEvent>> {
        self.ctx
            .bounded("report history", self.ctx.backend.events_for(id))
            .await
    }

    /// Most recent resolution among `submitter`'s active reports, for the
    /// resident feedback prompt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreUnavailable`] if the backend cannot be reached.
    pub async fn latest_resolved_for_submitter(
        &self,
        submitter: &str,
    ) -> Result<Option<(Report, StatusEvent)>> {
        let reports: Vec<Report> = self
            .ctx
            .bounded("list reports", self.ctx.backend.list_reports())
            .await?
            .into_iter()
            .filter(|r| r.submitter == submitter)
            .collect();
        let ids: Vec<ReportId> = reports.iter().map(|r| r.id.clone()).collect();
        let mut latest = self.latest_for_batch(&ids).await?;

        Ok(reports
            .into_iter()
            .filter_map(|report| {
                let event = latest.remove(&report.id)?;
                (event.status == Status::Resolved).then_some((report, event))
            })
            .max_by_key(|(_, event)| event.sequence))
    }
}

async fn refresh_cache(ctx: &StoreContext, event: &StatusEvent) {
    match ctx
        .bounded("refresh cached status", ctx.backend.refresh_cached_status(event))
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(report = %event.report_id, sequence = event.sequence, "cached status already newer");
        }
        Err(err) => {
            tracing::warn!(report = %event.report_id, error = %err, "cached status refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::model::{EventId, ReportDraft};
    use crate::tracker::Tracker;

    async fn tracker_with_report(config: TrackerConfig) -> (Tracker, ReportId) {
        let tracker = Tracker::in_memory(config);
        let id = tracker
            .reports()
            .submit(
                &Actor::resident("resident-1"),
                ReportDraft::new("Overflowing bin", "Not collected for a week").with_location("Purok 3"),
            )
            .await
            .expect("submit");
        (tracker, id)
    }

    fn official() -> Actor {
        Actor::official("official-1")
    }

    #[tokio::test]
    async fn residents_cannot_append() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let err = tracker
            .status_log()
            .append_event(
                &Actor::resident("resident-1"),
                AppendRequest::new(id, Status::Resolved),
            )
            .await
            .expect_err("resident");
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn progress_requires_response_by_default() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let err = tracker
            .status_log()
            .append_event(&official(), AppendRequest::new(id.clone(), Status::InProgress).with_response("   "))
            .await
            .expect_err("blank response");
        assert!(matches!(err, StoreError::InvalidInput { field: "official_response", .. }));

        let mut relaxed = TrackerConfig::default();
        relaxed.policy.require_progress_response = false;
        let (tracker, id) = tracker_with_report(relaxed).await;
        tracker
            .status_log()
            .append_event(&official(), AppendRequest::new(id, Status::InProgress))
            .await
            .expect("allowed without response");
    }

    #[tokio::test]
    async fn append_refreshes_cache_and_keeps_location() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let event = tracker
            .status_log()
            .append_event(&official(), AppendRequest::new(id.clone(), Status::InProgress).with_response("On it"))
            .await
            .expect("append");
        assert_eq!(event.location.as_deref(), Some("Purok 3"));
        assert_eq!(event.updated_by.as_deref(), Some("official-1"));

        let cached = tracker.reports().get(&id).await.expect("get");
        assert_eq!(cached.status, Status::InProgress);
        assert_eq!(cached.official_response.as_deref(), Some("On it"));
        assert_eq!(cached.status_sequence, event.sequence);
    }

    #[tokio::test]
    async fn regression_and_post_resolution_edits_are_rejected() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let log = tracker.status_log();
        log.append_event(&official(), AppendRequest::new(id.clone(), Status::InProgress).with_response("On it"))
            .await
            .expect("progress");

        let err = log
            .append_event(&official(), AppendRequest::new(id.clone(), Status::Pending))
            .await
            .expect_err("regression");
        assert!(matches!(err, StoreError::InvalidTransition { from: Status::InProgress, to: Status::Pending, .. }));

        log.append_event(&official(), AppendRequest::new(id.clone(), Status::Resolved))
            .await
            .expect("resolve");
        let err = log
            .append_event(&official(), AppendRequest::new(id.clone(), Status::Resolved).with_response("again"))
            .await
            .expect_err("post-resolution edit");
        assert!(matches!(err, StoreError::InvalidTransition { from: Status::Resolved, .. }));
        assert_eq!(log.history(&id).await.expect("history").len(), 2);
    }

    #[tokio::test]
    async fn post_resolution_edits_allowed_by_policy() {
        let mut config = TrackerConfig::default();
        config.policy.allow_post_resolution_edits = true;
        let (tracker, id) = tracker_with_report(config).await;
        let log = tracker.status_log();
        log.append_event(&official(), AppendRequest::new(id.clone(), Status::Resolved))
            .await
            .expect("resolve");
        let reopened = log
            .append_event(&official(), AppendRequest::new(id.clone(), Status::InProgress).with_response("Reopened"))
            .await
            .expect("reopen");
        assert_eq!(
            log.latest_for(&id).await.expect("latest").map(|e| e.sequence),
            Some(reopened.sequence)
        );
    }

    #[tokio::test]
    async fn ingest_is_idempotent_and_ordered_by_sequence() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let log = tracker.status_log();
        let make = |status, sequence| {
            NewStatusEvent {
                report_id: id.clone(),
                status,
                official_response: None,
                updated_by: Some("official-2".into()),
                location: None,
                updated_at: model::now(),
            }
            .assign(EventId::generate(), sequence)
        };
        let e1 = make(Status::InProgress, 5);
        let e2 = make(Status::Resolved, 3);

        assert_eq!(log.ingest(&official(), e1.clone()).await.expect("e1"), IngestOutcome::Inserted);
        assert_eq!(log.ingest(&official(), e2).await.expect("e2"), IngestOutcome::Inserted);
        assert_eq!(
            log.ingest(&official(), e1.clone()).await.expect("redeliver"),
            IngestOutcome::Duplicate
        );
        assert_eq!(log.latest_for(&id).await.expect("latest"), Some(e1));

        let zero = make(Status::Pending, 0);
        assert!(matches!(
            log.ingest(&official(), zero).await,
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn residents_cannot_ingest() {
        let (tracker, id) = tracker_with_report(TrackerConfig::default()).await;
        let log = tracker.status_log();
        let forged = NewStatusEvent {
            report_id: id.clone(),
            status: Status::Resolved,
            official_response: Some("Done".into()),
            updated_by: Some("official-2".into()),
            location: None,
            updated_at: model::now(),
        }
        .assign(EventId::generate(), 9);

        let err = log
            .ingest(&Actor::resident("resident-1"), forged)
            .await
            .expect_err("resident ingest");
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert!(log.history(&id).await.expect("history").is_empty());
        let report = tracker.reports().get(&id).await.expect("get");
        assert_eq!(report.status, Status::Pending);
    }

    #[tokio::test]
    async fn latest_resolved_for_submitter_picks_highest_sequence() {
        let tracker = Tracker::in_memory(TrackerConfig::default());
        let resident = Actor::resident("resident-7");
        let mut ids = Vec::new();
        for title in ["Clogged drain", "Stray dogs", "Illegal dumping"] {
            ids.push(
                tracker
                    .reports()
                    .submit(&resident, ReportDraft::new(title, "Please check"))
                    .await
                    .expect("submit"),
            );
        }
        let log = tracker.status_log();
        assert!(log.latest_resolved_for_submitter("resident-7").await.expect("none yet").is_none());

        log.append_event(&official(), AppendRequest::new(ids[1].clone(), Status::Resolved))
            .await
            .expect("resolve");
        log.append_event(&official(), AppendRequest::new(ids[0].clone(), Status::Resolved))
            .await
            .expect("resolve");
        log.append_event(&official(), AppendRequest::new(ids[2].clone(), Status::InProgress).with_response("Checking"))
            .await
            .expect("progress");

        let (report, event) = log
            .latest_resolved_for_submitter("resident-7")
            .await
            .expect("query")
            .expect("one resolved");
        assert_eq!(report.title, "Clogged drain");
        assert_eq!(event.status, Status::Resolved);
        assert!(log.latest_resolved_for_submitter("someone-else").await.expect("query").is_none());
    }
}
