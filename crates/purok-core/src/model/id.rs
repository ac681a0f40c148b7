//! Opaque server-minted identifiers.
//!
//! Every id is `<prefix>-<suffix>` where the suffix is ten characters of
//! lowercase base32. Ids are never derived from content, so a restored report
//! can never collide with the report it was archived from.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
const SUFFIX_LEN: usize = 10;

fn mint(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect();
    format!("{prefix}-{suffix}")
}

fn check(prefix: &'static str, field: &'static str, raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    let valid = trimmed
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| {
            !suffix.is_empty()
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        });
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(StoreError::invalid(
            field,
            format!("expected `{prefix}-<id>`, got '{raw}'"),
        ))
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix shared by every id of this kind.
            pub const PREFIX: &'static str = $prefix;

            /// Mint a fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(mint($prefix))
            }

            /// Wrap an id read back from storage without validating it.
            #[must_use]
            pub fn new_unchecked(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                check($prefix, $field, s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identity of an active report. Unique among active reports.
    ReportId,
    "rp",
    "report id"
);

define_id!(
    /// Identity of a single status event.
    EventId,
    "ev",
    "event id"
);

define_id!(
    /// Identity of an archive record, independent of the archived report id.
    ArchiveId,
    "ar",
    "archive id"
);
