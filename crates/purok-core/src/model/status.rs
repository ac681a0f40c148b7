use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::StoreError;

/// The three report lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Resolved,
}

impl Status {
    pub const ALL: [Self; 3] = [Self::Pending, Self::InProgress, Self::Resolved];

    /// Storage form, also accepted by [`Status::from_str`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    /// Human label as shown to residents.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Resolved => 2,
        }
    }

    /// Validate appending a `target` event on top of a report currently at `self`.
    ///
    /// Valid transitions:
    /// - `pending -> pending | in_progress | resolved`
    /// - `in_progress -> in_progress | resolved`
    /// - `resolved -> *` only when `policy.allow_post_resolution_edits`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] for regressions and for
    /// edits after resolution when the policy forbids them.
    pub fn check_transition(self, target: Self, policy: TransitionPolicy) -> Result<(), StoreError> {
        if self == Self::Resolved {
            if policy.allow_post_resolution_edits {
                return Ok(());
            }
            return Err(StoreError::InvalidTransition {
                from: self,
                to: target,
                reason: "report is already resolved",
            });
        }

        if target.rank() < self.rank() {
            return Err(StoreError::InvalidTransition {
                from: self,
                to: target,
                reason: "status cannot regress",
            });
        }

        Ok(())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = StoreError;

    /// Canonicalize any casing/spacing of the three states.
    ///
    /// `"In Progress"`, `"in_progress"`, `"IN-PROGRESS"` and `"inprogress"`
    /// all map to [`Status::InProgress`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            _ => Err(StoreError::invalid(
                "status",
                format!("'{s}' is not one of pending, in progress, resolved"),
            )),
        }
    }
}

/// Rules applied by the status log before accepting an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Permit further events after a report is resolved.
    pub allow_post_resolution_edits: bool,
    /// Refuse `in_progress` events that carry no response text.
    pub require_progress_response: bool,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            allow_post_resolution_edits: false,
            require_progress_response: true,
        }
    }
}
