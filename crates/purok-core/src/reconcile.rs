//! Effective status: the single read path for "what state is this report in".
//!
//! The latest log event wins. The report's cached fields are only a fallback
//! for reports with no history or when the log cannot be read.

use std::collections::HashMap;

use crate::model::{Report, ReportId, Status, StatusEvent};
use crate::store::StatusLog;

/// Where a reconciled status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Latest event in the status log.
    Log { sequence: u64 },
    /// The report's cached fields.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledStatus {
    pub status: Status,
    pub official_response: Option<String>,
    pub source: StatusSource,
}

/// Pure reconciliation rule.
#[must_use]
pub fn reconcile(report: &Report, latest: Option<&StatusEvent>) -> ReconciledStatus {
    latest.map_or_else(
        || ReconciledStatus {
            status: report.status,
            official_response: report.official_response.clone(),
            source: StatusSource::Cache,
        },
        |event| ReconciledStatus {
            status: event.status,
            official_response: event.official_response.clone(),
            source: StatusSource::Log {
                sequence: event.sequence,
            },
        },
    )
}

#[must_use]
pub fn effective_status(report: &Report, latest: Option<&StatusEvent>) -> Status {
    reconcile(report, latest).status
}

/// Async reconciler over the status log. Never fails.
#[derive(Debug, Clone)]
pub struct Reconciler {
    log: StatusLog,
}

impl Reconciler {
    #[must_use]
    pub const fn new(log: StatusLog) -> Self {
        Self { log }
    }

    pub async fn reconcile(&self, report: &Report) -> ReconciledStatus {
        match self.log.latest_for(&report.id).await {
            Ok(latest) => reconcile(report, latest.as_ref()),
            Err(err) => {
                tracing::warn!(report = %report.id, error = %err, "status log unreadable, using cached status");
                reconcile(report, None)
            }
        }
    }

    pub async fn effective_status(&self, report: &Report) -> Status {
        self.reconcile(report).await.status
    }

    /// Reconcile many reports with one batched log read.
    pub async fn reconcile_all(&self, reports: &[Report]) -> HashMap<ReportId, ReconciledStatus> {
        let ids: Vec<ReportId> = reports.iter().map(|r| r.id.clone()).collect();
        let latest = match self.log.latest_for_batch(&ids).await {
            Ok(latest) => latest,
            Err(err) => {
                tracing::warn!(count = ids.len(), error = %err, "status log unreadable, using cached statuses");
                HashMap::new()
            }
        };

        reports
            .iter()
            .map(|report| (report.id.clone(), reconcile(report, latest.get(&report.id))))
            .collect()
    }

    pub async fn effective_statuses(&self, reports: &[Report]) -> HashMap<ReportId, Status> {
        self.reconcile_all(reports)
            .await
            .into_iter()
            .map(|(id, reconciled)| (id, reconciled.status))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventId, NewStatusEvent, ReportDraft};
    use chrono::Utc;

    fn report() -> Report {
        ReportDraft::new("Broken streetlight", "Dark since Monday")
            .into_report(ReportId::generate(), "resident-1", Utc::now())
            .expect("valid draft")
    }

    fn event(report: &Report, status: Status, sequence: u64) -> StatusEvent {
        NewStatusEvent {
            report_id: report.id.clone(),
            status,
            official_response: Some(format!("seq {sequence}")),
            updated_by: Some("official-1".into()),
            location: None,
            updated_at: Utc::now(),
        }
        .assign(EventId::generate(), sequence)
    }

    #[test]
    fn no_history_falls_back_to_cache() {
        let mut r = report();
        assert_eq!(effective_status(&r, None), Status::Pending);
        r.status = Status::InProgress;
        let reconciled = reconcile(&r, None);
        assert_eq!(reconciled.status, Status::InProgress);
        assert_eq!(reconciled.source, StatusSource::Cache);
    }

    #[test]
    fn log_beats_stale_cache() {
        let mut r = report();
        r.status = Status::Resolved;
        let latest = event(&r, Status::InProgress, 4);
        let reconciled = reconcile(&r, Some(&latest));
        assert_eq!(reconciled.status, Status::InProgress);
        assert_eq!(reconciled.official_response.as_deref(), Some("seq 4"));
        assert_eq!(reconciled.source, StatusSource::Log { sequence: 4 });
    }
}
