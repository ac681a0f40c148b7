use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::{ArchiveRecord, Report, Status};
use crate::reconcile::reconcile;
use crate::store::{ArchiveStore, ReportStore, StatusLog};

/// An active report with its reconciled status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    pub report: Report,
    pub status: Status,
    pub official_response: Option<String>,
}

/// A viewer's local copy of the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    /// Active reports, newest first.
    pub reports: Vec<ReportView>,
    /// Archive records, most recently archived first.
    pub archived: Vec<ArchiveRecord>,
    /// Set when the last resync gave up; the data above is from the last
    /// successful one.
    pub stale: bool,
    /// Completed resync attempts, successful or not.
    pub generation: u64,
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncSnapshot {
    #[must_use]
    pub fn count_by_status(&self, status: Status) -> usize {
        self.reports.iter().filter(|view| view.status == status).count()
    }
}

/// Read access the sync client needs to rebuild a snapshot.
#[derive(Debug, Clone)]
pub struct SyncSource {
    reports: ReportStore,
    log: StatusLog,
    archive: ArchiveStore,
}

impl SyncSource {
    pub(crate) const fn new(reports: ReportStore, log: StatusLog, archive: ArchiveStore) -> Self {
        Self {
            reports,
            log,
            archive,
        }
    }

    /// Read everything a viewer shows: active reports, their statuses (one
    /// batched log read) and the archive.
    ///
    /// Unlike [`Reconciler`](crate::reconcile::Reconciler), an unreadable log
    /// fails the load instead of falling back to cached statuses.
    ///
    /// # Errors
    ///
    /// Returns the first store error; nothing partial is returned.
    pub async fn load(&self) -> Result<(Vec<ReportView>, Vec<ArchiveRecord>)> {
        let reports = self.reports.get_active().await?;
        let ids: Vec<_> = reports.iter().map(|report| report.id.clone()).collect();
        let latest = self.log.latest_for_batch(&ids).await?;
        let archived = self.archive.list().await?;

        let views = reports
            .into_iter()
            .map(|report| {
                let reconciled = reconcile(&report, latest.get(&report.id));
                ReportView {
                    report,
                    status: reconciled.status,
                    official_response: reconciled.official_response,
                }
            })
            .collect();

        Ok((views, archived))
    }
}
