use std::fmt;

use crate::model::{ReportId, Status};

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    NotFound,
    InvalidInput,
    InvalidTransition,
    PermissionDenied,
    InFlight,
    StoreUnavailable,
    PartialFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::NotFound => "E2001",
            Self::InvalidInput => "E2002",
            Self::InvalidTransition => "E2003",
            Self::PermissionDenied => "E2004",
            Self::InFlight => "E2005",
            Self::StoreUnavailable => "E5001",
            Self::PartialFailure => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Report or archive record not found",
            Self::InvalidInput => "Invalid input",
            Self::InvalidTransition => "Invalid status transition",
            Self::PermissionDenied => "Permission denied",
            Self::InFlight => "Action already in flight",
            Self::StoreUnavailable => "Store unavailable",
            Self::PartialFailure => "Partial failure between store steps",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .purok/config.toml and retry."),
            Self::NotFound => Some("Run `purok list` or `purok archived` to see current ids."),
            Self::InvalidInput => None,
            Self::InvalidTransition => {
                Some("Follow valid transitions: pending -> in progress -> resolved.")
            }
            Self::PermissionDenied => Some("Act as an official or collector for this command."),
            Self::InFlight => Some("Wait for the pending action on this report to finish."),
            Self::StoreUnavailable => Some("Check the database path and retry."),
            Self::PartialFailure => Some("Run `purok verify` and resolve the reported overlap."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which kind of record an operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Report,
    Archive,
    Event,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Report => "report",
            Self::Archive => "archive record",
            Self::Event => "status event",
        })
    }
}

/// Errors returned by the stores and backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The targeted report or archive record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// Empty required field, malformed URI or unrecognized status value.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// Policy-disallowed regression or post-resolution edit.
    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: Status,
        to: Status,
        reason: &'static str,
    },

    /// The actor's role may not perform this operation.
    #[error("{actor} may not {action}")]
    PermissionDenied { actor: String, action: &'static str },

    /// The same session already has an action running for this report.
    #[error("an action on {0} is already in flight in this session")]
    InFlight(String),

    /// Backing persistence unreachable or timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A two-step operation failed between steps and compensation failed too.
    #[error("{operation} left the stores inconsistent: {detail}")]
    PartialFailure {
        operation: &'static str,
        detail: String,
    },

    /// A spawned mutation task died without producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn report_not_found(id: &ReportId) -> Self {
        Self::NotFound {
            entity: Entity::Report,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(err: impl fmt::Display) -> Self {
        Self::StoreUnavailable(err.to_string())
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::InFlight(_) => ErrorCode::InFlight,
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            Self::PartialFailure { .. } => ErrorCode::PartialFailure,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::unavailable(err)
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
