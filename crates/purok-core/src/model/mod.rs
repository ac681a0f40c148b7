//! Domain types: reports, status events, archive records and actors.

pub mod actor;
pub mod archive;
pub mod event;
pub mod id;
pub mod report;
pub mod status;

use chrono::{DateTime, SubsecRound, Utc};

pub use actor::{Actor, Role};
pub use archive::{ArchiveRecord, UNKNOWN_LOCATION};
pub use event::{AppendRequest, NewStatusEvent, StatusEvent};
pub use id::{ArchiveId, EventId, ReportId};
pub use report::{AttachmentInput, Report, ReportDraft, validate_uri};
pub use status::{Status, TransitionPolicy};

/// Drop sub-microsecond precision. Stores persist timestamps as epoch
/// microseconds, so every timestamp a store hands back is at this precision.
#[must_use]
pub fn store_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Current time at store precision.
#[must_use]
pub fn now() -> DateTime<Utc> {
    store_precision(Utc::now())
}
