use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::StoreError;

/// Role supplied by the identity provider alongside the actor reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Resident,
    Official,
    /// Waste collectors are provisioned as officials with a narrower title.
    Collector,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Official => "official",
            Self::Collector => "collector",
        }
    }

    /// Whether this role may respond to, archive or restore reports.
    #[must_use]
    pub const fn is_official(self) -> bool {
        matches!(self, Self::Official | Self::Collector)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resident" => Ok(Self::Resident),
            "official" => Ok(Self::Official),
            "collector" => Ok(Self::Collector),
            _ => Err(StoreError::invalid(
                "role",
                format!("'{s}' is not one of resident, official, collector"),
            )),
        }
    }
}

/// An authenticated actor reference injected into every mutating call.
///
/// The core never authenticates; it only checks the role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn resident(id: impl Into<String>) -> Self {
        Self::new(id, Role::Resident)
    }

    pub fn official(id: impl Into<String>) -> Self {
        Self::new(id, Role::Official)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::PermissionDenied`] unless the actor is an
    /// official or collector.
    pub fn require_official(&self, action: &'static str) -> Result<(), StoreError> {
        if self.role.is_official() {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied {
                actor: self.to_string(),
                action,
            })
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn collectors_act_as_officials() {
        assert!(Role::Collector.is_official());
        assert!(Role::Official.is_official());
        assert!(!Role::Resident.is_official());
    }

    #[test]
    fn residents_are_denied_official_actions() {
        let err = Actor::resident("u-1")
            .require_official("archive reports")
            .expect_err("resident");
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.to_string(), "u-1 (resident) may not archive reports");
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!("Collector".parse::<Role>().expect("collector"), Role::Collector);
        assert!("mayor".parse::<Role>().is_err());
    }
}
