use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::TransitionPolicy;

/// Directory holding the database and config for a project.
pub const PUROK_DIR: &str = ".purok";

/// Environment variable overriding `[store] database`.
pub const DATABASE_ENV: &str = "PUROK_DB";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allow_post_resolution_edits: bool,
    #[serde(default = "default_true")]
    pub require_progress_response: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_post_resolution_edits: false,
            require_progress_response: default_true(),
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub const fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            allow_post_resolution_edits: self.allow_post_resolution_edits,
            require_progress_response: self.require_progress_response,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Signals arriving within this window after the first collapse into one resync.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Per-subscriber signal queue depth.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on any single store operation.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Extra attempts for the removal step of archive/restore.
    #[serde(default = "default_mutation_retries")]
    pub mutation_retries: u32,
    /// Database path, relative to the project root unless absolute.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: default_op_timeout_ms(),
            mutation_retries: default_mutation_retries(),
            database: None,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Load `.purok/config.toml` under `project_root`, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<TrackerConfig> {
    let path = project_root.join(PUROK_DIR).join("config.toml");
    if !path.exists() {
        return Ok(TrackerConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<TrackerConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the database path: `PUROK_DB`, then `[store] database`, then
/// `.purok/purok.sqlite3`.
#[must_use]
pub fn database_path(project_root: &Path, config: &TrackerConfig) -> PathBuf {
    resolve_database_path(
        project_root,
        config,
        std::env::var_os(DATABASE_ENV).map(PathBuf::from),
    )
}

fn resolve_database_path(
    project_root: &Path,
    config: &TrackerConfig,
    env_override: Option<PathBuf>,
) -> PathBuf {
    let chosen = env_override
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| config.store.database.clone());

    match chosen {
        Some(path) if path.is_absolute() => path,
        Some(path) => project_root.join(path),
        None => project_root.join(PUROK_DIR).join("purok.sqlite3"),
    }
}

const fn default_true() -> bool {
    true
}

const fn default_coalesce_window_ms() -> u64 {
    100
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_base_ms() -> u64 {
    50
}

const fn default_backoff_max_ms() -> u64 {
    2_000
}

const fn default_channel_capacity() -> usize {
    64
}

const fn default_op_timeout_ms() -> u64 {
    5_000
}

const fn default_mutation_retries() -> u32 {
    2
}
