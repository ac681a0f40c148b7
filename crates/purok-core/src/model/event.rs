use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{EventId, ReportId};
use super::status::Status;
use super::store_precision;
use crate::error::StoreError;

/// One immutable entry in a report's status history.
///
/// `sequence` is assigned by the authoritative backend and is the only
/// ordering used to decide which event is current. `updated_at` is carried
/// for display and may be skewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: EventId,
    pub report_id: ReportId,
    pub sequence: u64,
    pub status: Status,
    pub official_response: Option<String>,
    pub updated_by: Option<String>,
    pub location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusEvent {
    /// The event as a store keeps it.
    #[must_use]
    pub fn at_store_precision(mut self) -> Self {
        self.updated_at = store_precision(self.updated_at);
        self
    }

    /// Pick the event with the highest sequence.
    pub fn latest<'a>(events: impl IntoIterator<Item = &'a Self>) -> Option<&'a Self> {
        events.into_iter().max_by_key(|event| event.sequence)
    }
}

/// An event before the backend has assigned its id and sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatusEvent {
    pub report_id: ReportId,
    pub status: Status,
    pub official_response: Option<String>,
    pub updated_by: Option<String>,
    pub location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl NewStatusEvent {
    /// Attach the backend-assigned identity. `updated_at` is cut to store
    /// precision so the returned event equals what a store reads back.
    #[must_use]
    pub fn assign(self, id: EventId, sequence: u64) -> StatusEvent {
        StatusEvent {
            id,
            report_id: self.report_id,
            sequence,
            status: self.status,
            official_response: self.official_response,
            updated_by: self.updated_by,
            location: self.location,
            updated_at: store_precision(self.updated_at),
        }
    }
}

/// An official's request to append a status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub report_id: ReportId,
    pub status: Status,
    pub response: Option<String>,
    /// Location snapshot; defaults to the report's own location.
    pub location: Option<String>,
}

impl AppendRequest {
    #[must_use]
    pub const fn new(report_id: ReportId, status: Status) -> Self {
        Self {
            report_id,
            status,
            response: None,
            location: None,
        }
    }

    /// Build a request from an untyped status string, canonicalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] if `raw_status` is not a
    /// recognized status.
    pub fn from_raw(report_id: ReportId, raw_status: &str) -> Result<Self, StoreError> {
        Ok(Self::new(report_id, raw_status.parse()?))
    }

    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Trimmed response text, `None` when blank.
    #[must_use]
    pub fn normalized_response(&self) -> Option<String> {
        self.response
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}
