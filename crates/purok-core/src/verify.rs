//! Whole-store consistency checks.
//!
//! Checked invariants:
//! - no logical report is both active and archived
//! - a report's cached status never claims a sequence the log does not have
//! - each report's history is strictly ordered by sequence and only holds
//!   its own events
//!
//! A cache that lags the log is reported separately: it is allowed (the
//! refresh is best-effort) and reads go through the reconciler anyway.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::backend::Backend;
use crate::error::Result;
use crate::model::{ArchiveId, EventId, ReportId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// An active report and an archive record describe the same report.
    ActiveAndArchived {
        report_id: ReportId,
        archive_id: ArchiveId,
    },
    /// A restored report is live while the record it came from still exists.
    RestoredAndArchived {
        report_id: ReportId,
        archive_id: ArchiveId,
    },
    /// Cached fields were refreshed from a sequence the log does not hold.
    CacheAheadOfLog {
        report_id: ReportId,
        cached_sequence: u64,
        latest_sequence: Option<u64>,
    },
    /// Cached status disagrees with the event it claims to mirror.
    CacheMismatch { report_id: ReportId, sequence: u64 },
    /// History is not strictly increasing by sequence.
    HistoryOutOfOrder { report_id: ReportId, sequence: u64 },
    /// An event filed under another report's history.
    ForeignEvent {
        report_id: ReportId,
        event_id: EventId,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveAndArchived {
                report_id,
                archive_id,
            } => write!(f, "{report_id} is active and archived as {archive_id}"),
            Self::RestoredAndArchived {
                report_id,
                archive_id,
            } => write!(f, "{report_id} was restored but {archive_id} still exists"),
            Self::CacheAheadOfLog {
                report_id,
                cached_sequence,
                latest_sequence,
            } => match latest_sequence {
                Some(latest) => write!(
                    f,
                    "{report_id} cache at sequence {cached_sequence} but log ends at {latest}"
                ),
                None => write!(
                    f,
                    "{report_id} cache at sequence {cached_sequence} but log is empty"
                ),
            },
            Self::CacheMismatch {
                report_id,
                sequence,
            } => write!(f, "{report_id} cache disagrees with event {sequence}"),
            Self::HistoryOutOfOrder {
                report_id,
                sequence,
            } => write!(f, "{report_id} history out of order at sequence {sequence}"),
            Self::ForeignEvent {
                report_id,
                event_id,
            } => write!(f, "{event_id} filed under {report_id} belongs elsewhere"),
        }
    }
}

/// Aggregate verification report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub reports_checked: usize,
    pub archives_checked: usize,
    pub events_checked: usize,
    pub violations: Vec<Violation>,
    /// Reports whose cached status lags the log. Informational.
    pub lagging_caches: Vec<ReportId>,
}

impl VerifyReport {
    /// Return `true` when no invariant is violated.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Read every report, archive record and active history and check them.
///
/// # Errors
///
/// Returns an error if the backend cannot be read.
pub async fn verify_store(backend: &dyn Backend) -> Result<VerifyReport> {
    let reports = backend.list_reports().await?;
    let archives = backend.list_archives().await?;

    let mut report = VerifyReport {
        reports_checked: reports.len(),
        archives_checked: archives.len(),
        ..VerifyReport::default()
    };

    // A failed compensation can leave several records for one report.
    let mut archived_by_report: HashMap<&ReportId, Vec<&ArchiveId>> = HashMap::new();
    for archive in &archives {
        archived_by_report
            .entry(&archive.report_id)
            .or_default()
            .push(&archive.id);
    }

    for active in &reports {
        for &archive_id in archived_by_report.get(&active.id).into_iter().flatten() {
            report.violations.push(Violation::ActiveAndArchived {
                report_id: active.id.clone(),
                archive_id: archive_id.clone(),
            });
        }
        if let Some(origin) = &active.restored_from {
            for &archive_id in archived_by_report.get(origin).into_iter().flatten() {
                report.violations.push(Violation::RestoredAndArchived {
                    report_id: active.id.clone(),
                    archive_id: archive_id.clone(),
                });
            }
        }
    }

    let mut history_ids: Vec<ReportId> = reports.iter().map(|r| r.id.clone()).collect();
    let mut seen: HashSet<ReportId> = history_ids.iter().cloned().collect();
    for archive in &archives {
        if seen.insert(archive.report_id.clone()) {
            history_ids.push(archive.report_id.clone());
        }
    }

    let mut latest = HashMap::new();
    for id in &history_ids {
        let history = backend.events_for(id).await?;
        report.events_checked += history.len();

        let mut previous: Option<u64> = None;
        for event in &history {
            if &event.report_id != id {
                report.violations.push(Violation::ForeignEvent {
                    report_id: id.clone(),
                    event_id: event.id.clone(),
                });
            }
            if previous.is_some_and(|prev| event.sequence <= prev) {
                report.violations.push(Violation::HistoryOutOfOrder {
                    report_id: id.clone(),
                    sequence: event.sequence,
                });
            }
            previous = Some(event.sequence);
        }

        if let Some(last) = history.iter().max_by_key(|e| e.sequence) {
            latest.insert(id.clone(), last.clone());
        }
        if let Some(active) = reports.iter().find(|r| &r.id == id)
            && active.status_sequence > 0
        {
            if let Some(mirrored) = history.iter().find(|e| e.sequence == active.status_sequence) {
                if mirrored.status != active.status
                    || mirrored.official_response != active.official_response
                {
                    report.violations.push(Violation::CacheMismatch {
                        report_id: id.clone(),
                        sequence: active.status_sequence,
                    });
                }
            } else {
                report.violations.push(Violation::CacheAheadOfLog {
                    report_id: id.clone(),
                    cached_sequence: active.status_sequence,
                    latest_sequence: history.iter().map(|e| e.sequence).max(),
                });
            }
        }
    }

    for active in &reports {
        if latest
            .get(&active.id)
            .is_some_and(|event| event.sequence > active.status_sequence)
        {
            report.lagging_caches.push(active.id.clone());
        }
    }

    if report.is_ok() {
        tracing::debug!(
            reports = report.reports_checked,
            archives = report.archives_checked,
            events = report.events_checked,
            "store verified"
        );
    } else {
        tracing::warn!(violations = report.violations.len(), "store verification found violations");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::model::{ArchiveRecord, NewStatusEvent, Report, ReportDraft, Status};
    use chrono::Utc;

    fn report(title: &str) -> Report {
        ReportDraft::new(title, "desc")
            .into_report(ReportId::generate(), "resident-1", Utc::now())
            .expect("valid draft")
    }

    fn new_event(report: &Report, status: Status) -> NewStatusEvent {
        NewStatusEvent {
            report_id: report.id.clone(),
            status,
            official_response: Some("ok".into()),
            updated_by: Some("official-1".into()),
            location: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn clean_store_verifies() {
        let backend = MemoryBackend::new();
        let r = report("a");
        backend.insert_report(&r).await.expect("insert");
        let event = backend
            .append_event(new_event(&r, Status::InProgress))
            .await
            .expect("append");
        backend.refresh_cached_status(&event).await.expect("refresh");

        let result = verify_store(&backend).await.expect("verify");
        assert!(result.is_ok(), "{:?}", result.violations);
        assert_eq!(result.reports_checked, 1);
        assert_eq!(result.events_checked, 1);
        assert!(result.lagging_caches.is_empty());
    }

    #[tokio::test]
    async fn overlap_is_a_violation() {
        let backend = MemoryBackend::new();
        let r = report("a");
        backend.insert_report(&r).await.expect("insert");
        let record = ArchiveRecord::snapshot(&r, Status::Pending, None, Utc::now());
        backend.insert_archive(&record).await.expect("insert archive");

        let result = verify_store(&backend).await.expect("verify");
        assert_eq!(
            result.violations,
            vec![Violation::ActiveAndArchived {
                report_id: r.id.clone(),
                archive_id: record.id.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn every_overlapping_record_is_reported() {
        let backend = MemoryBackend::new();
        let r = report("a");
        backend.insert_report(&r).await.expect("insert");
        let first = ArchiveRecord::snapshot(&r, Status::Pending, None, Utc::now());
        let second = ArchiveRecord::snapshot(&r, Status::Pending, None, Utc::now());
        backend.insert_archive(&first).await.expect("insert archive");
        backend.insert_archive(&second).await.expect("insert archive");

        let result = verify_store(&backend).await.expect("verify");
        let mut flagged: Vec<ArchiveId> = result
            .violations
            .iter()
            .filter_map(|v| match v {
                Violation::ActiveAndArchived { report_id, archive_id } if *report_id == r.id => {
                    Some(archive_id.clone())
                }
                _ => None,
            })
            .collect();
        flagged.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(flagged, expected);
    }

    #[tokio::test]
    async fn lagging_cache_is_informational() {
        let backend = MemoryBackend::new();
        let r = report("a");
        backend.insert_report(&r).await.expect("insert");
        backend
            .append_event(new_event(&r, Status::InProgress))
            .await
            .expect("append");

        let result = verify_store(&backend).await.expect("verify");
        assert!(result.is_ok());
        assert_eq!(result.lagging_caches, vec![r.id]);
    }

    #[tokio::test]
    async fn cache_without_matching_event_is_a_violation() {
        let backend = MemoryBackend::new();
        let mut r = report("a");
        r.status = Status::Resolved;
        r.status_sequence = 42;
        backend.insert_report(&r).await.expect("insert");

        let result = verify_store(&backend).await.expect("verify");
        assert!(matches!(
            result.violations.as_slice(),
            [Violation::CacheAheadOfLog { cached_sequence: 42, latest_sequence: None, .. }]
        ));
    }
}
