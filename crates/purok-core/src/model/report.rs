use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ReportId;
use super::status::Status;
use crate::error::StoreError;

/// An active citizen report.
///
/// `status` and `official_response` are a cache refreshed from the status
/// log; read paths go through the reconciler instead of trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub title: String,
    pub description: String,
    pub attachments: Vec<String>,
    pub location: Option<String>,
    pub submitter: String,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub official_response: Option<String>,
    /// Log sequence the cached fields were last refreshed from (0 = never).
    pub status_sequence: u64,
    /// Report id this one was restored from, if any. Informational only.
    pub restored_from: Option<ReportId>,
}

/// Attachment field as it arrives at the intake boundary.
///
/// Older clients stored the list as a JSON-encoded string, sometimes as a
/// single bare URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentInput {
    List(Vec<String>),
    Raw(String),
}

impl Default for AttachmentInput {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl From<Vec<String>> for AttachmentInput {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl AttachmentInput {
    /// Flatten into an ordered list of trimmed, non-empty entries.
    #[must_use]
    pub fn normalize(self) -> Vec<String> {
        let list = match self {
            Self::List(list) => list,
            Self::Raw(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else if trimmed.starts_with('[') {
                    serde_json::from_str::<Vec<String>>(trimmed)
                        .unwrap_or_else(|_| vec![trimmed.to_string()])
                } else {
                    vec![trimmed.to_string()]
                }
            }
        };

        list.into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect()
    }
}

/// What a resident supplies when submitting a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub attachments: AttachmentInput,
    #[serde(default)]
    pub location: Option<String>,
}

impl ReportDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: impl Into<AttachmentInput>) -> Self {
        self.attachments = attachments.into();
        self
    }

    /// Validate the draft and build a pending report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] if the title or description is
    /// blank or any attachment is not a well-formed absolute URI.
    pub fn into_report(
        self,
        id: ReportId,
        submitter: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Report, StoreError> {
        let title = required("title", &self.title)?;
        let description = required("description", &self.description)?;
        let attachments = self.attachments.normalize();
        for uri in &attachments {
            validate_uri(uri)?;
        }

        Ok(Report {
            id,
            title,
            description,
            attachments,
            location: normalize_location(self.location),
            submitter: submitter.to_string(),
            created_at,
            status: Status::Pending,
            official_response: None,
            status_sequence: 0,
            restored_from: None,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(StoreError::invalid(field, "must not be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}

pub(crate) fn normalize_location(location: Option<String>) -> Option<String> {
    location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

/// Check that `uri` is an absolute URI: `scheme ":" rest`.
///
/// The scheme follows RFC 3986 (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`).
/// Web schemes must carry a non-empty authority after `//`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] naming the offending attachment.
pub fn validate_uri(uri: &str) -> Result<(), StoreError> {
    let malformed = |reason: &str| StoreError::invalid("attachment", format!("'{uri}' {reason}"));

    if uri.chars().any(char::is_whitespace) {
        return Err(malformed("contains whitespace"));
    }

    let Some((scheme, rest)) = uri.split_once(':') else {
        return Err(malformed("has no scheme"));
    };

    let mut chars = scheme.chars();
    let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !scheme_ok {
        return Err(malformed("has an invalid scheme"));
    }

    if rest.is_empty() {
        return Err(malformed("is empty after the scheme"));
    }

    if matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
        let authority = rest
            .strip_prefix("//")
            .map(|r| r.split(['/', '?', '#']).next().unwrap_or_default());
        if authority.is_none_or(str::is_empty) {
            return Err(malformed("has no host"));
        }
    }

    Ok(())
}
