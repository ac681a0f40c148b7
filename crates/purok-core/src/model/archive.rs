use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ArchiveId, ReportId};
use super::report::Report;
use super::status::Status;

/// Location recorded on restore when the snapshot carries none.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Cold-storage snapshot of a report taken at archive time.
///
/// `report_id` is a historical link only: once restored, the report comes
/// back under a new id and this link (and the status history behind it) is
/// orphaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: ArchiveId,
    pub report_id: ReportId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub attachments: Vec<String>,
    pub official_response: Option<String>,
    pub location: Option<String>,
    pub submitter: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Snapshot `report` with the reconciled `status` and `response`.
    #[must_use]
    pub fn snapshot(
        report: &Report,
        status: Status,
        official_response: Option<String>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ArchiveId::generate(),
            report_id: report.id.clone(),
            title: report.title.clone(),
            description: report.description.clone(),
            status,
            attachments: report.attachments.clone(),
            official_response,
            location: report.location.clone(),
            submitter: report.submitter.clone(),
            created_at: report.created_at,
            archived_at,
        }
    }

    /// Build the fresh pending report that restoration inserts.
    #[must_use]
    pub fn to_restored_report(&self, created_at: DateTime<Utc>) -> Report {
        Report {
            id: ReportId::generate(),
            title: self.title.clone(),
            description: self.description.clone(),
            attachments: self.attachments.clone(),
            location: Some(
                self.location
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            ),
            submitter: self.submitter.clone(),
            created_at,
            status: Status::Pending,
            official_response: self.official_response.clone(),
            status_sequence: 0,
            restored_from: Some(self.report_id.clone()),
        }
    }
}
