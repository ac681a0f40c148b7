use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::backend::{Backend, MemoryBackend, SqliteBackend};
use crate::config::{self, TrackerConfig};
use crate::model::Actor;
use crate::notify::{Notifier, Subscription, Topic};
use crate::reconcile::Reconciler;
use crate::session::Session;
use crate::store::{ArchiveStore, ReportStore, StatusLog, StoreContext};
use crate::sync::{SyncClient, SyncSource};
use crate::verify::{self, VerifyReport};

/// Wires one backend and one notifier to the stores.
///
/// Cheap to clone; clones share the backend, the notifier and the stores.
#[derive(Debug, Clone)]
pub struct Tracker {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    config: Arc<TrackerConfig>,
    reports: ReportStore,
    log: StatusLog,
    reconciler: Reconciler,
    archive: ArchiveStore,
}

impl Tracker {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: TrackerConfig) -> Self {
        let notifier = Notifier::new(config.sync.channel_capacity);
        let ctx = Arc::new(StoreContext::new(Arc::clone(&backend), notifier.clone(), &config));
        let log = StatusLog::new(Arc::clone(&ctx));
        let reconciler = Reconciler::new(log.clone());
        Self {
            reports: ReportStore::new(Arc::clone(&ctx)),
            archive: ArchiveStore::new(Arc::clone(&ctx), reconciler.clone()),
            log,
            reconciler,
            backend,
            notifier,
            config: Arc::new(config),
        }
    }

    /// Tracker over a fresh in-memory backend.
    #[must_use]
    pub fn in_memory(config: TrackerConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Tracker over a SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_sqlite(path: &Path, config: TrackerConfig) -> anyhow::Result<Self> {
        let backend = SqliteBackend::open(path)
            .with_context(|| format!("open report database {}", path.display()))?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Load `.purok/config.toml` under `project_root` and open the
    /// configured database.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed or the database cannot
    /// be opened.
    pub fn open_project(project_root: &Path) -> anyhow::Result<Self> {
        let config = config::load_config(project_root)?;
        let db_path = config::database_path(project_root, &config);
        tracing::debug!(db = %db_path.display(), "opening project store");
        Self::open_sqlite(&db_path, config)
    }

    #[must_use]
    pub const fn reports(&self) -> &ReportStore {
        &self.reports
    }

    #[must_use]
    pub const fn status_log(&self) -> &StatusLog {
        &self.log
    }

    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[must_use]
    pub const fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Open a session acting as `actor`.
    #[must_use]
    pub fn session(&self, actor: Actor) -> Session {
        Session::new(self.clone(), actor)
    }

    /// Subscribe to change signals. An empty slice subscribes to every topic.
    #[must_use]
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        self.notifier.subscribe(topics)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.notifier.unsubscribe(subscription);
    }

    /// Start a sync client using the configured `[sync]` settings.
    pub async fn sync_client(&self) -> SyncClient {
        let subscription = self.notifier.subscribe(&Topic::ALL);
        SyncClient::start(self.sync_source(), subscription, self.config.sync.clone()).await
    }

    #[must_use]
    pub fn sync_source(&self) -> SyncSource {
        SyncSource::new(
            self.reports.clone(),
            self.log.clone(),
            self.archive.clone(),
        )
    }

    /// Check whole-store invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn verify(&self) -> crate::error::Result<VerifyReport> {
        verify::verify_store(self.backend.as_ref()).await
    }
}
