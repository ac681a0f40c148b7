//! Report store, status history log and archive store.
//!
//! All three share a [`StoreContext`]: the backend, the notifier, the
//! transition policy and the time bound applied to every backend call.
//!
//! Mutations are spawned onto the runtime and awaited through their join
//! handle. Dropping the caller's future therefore never cancels a mutation
//! halfway; the work runs to completion and its result is discarded.

pub mod archive;
pub mod history;
pub mod reports;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::config::TrackerConfig;
use crate::error::{Result, StoreError};
use crate::model::TransitionPolicy;
use crate::notify::Notifier;

pub use archive::ArchiveStore;
pub use history::StatusLog;
pub use reports::ReportStore;

pub(crate) struct StoreContext {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) notifier: Notifier,
    pub(crate) policy: TransitionPolicy,
    pub(crate) op_timeout: Duration,
    pub(crate) mutation_retries: u32,
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("policy", &self.policy)
            .field("op_timeout", &self.op_timeout)
            .field("mutation_retries", &self.mutation_retries)
            .finish_non_exhaustive()
    }
}

impl StoreContext {
    pub(crate) fn new(backend: Arc<dyn Backend>, notifier: Notifier, config: &TrackerConfig) -> Self {
        Self {
            backend,
            notifier,
            policy: config.policy.transition_policy(),
            op_timeout: config.store.op_timeout(),
            mutation_retries: config.store.mutation_retries,
        }
    }

    /// Run one backend call under the store timeout.
    pub(crate) async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.op_timeout.as_millis(), "store call timed out");
                Err(StoreError::unavailable(format!(
                    "{op} timed out after {} ms",
                    self.op_timeout.as_millis()
                )))
            }
        }
    }

    /// Run a backend call, retrying transient failures up to
    /// `mutation_retries` extra times.
    pub(crate) async fn bounded_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.bounded(op, call()).await {
                Err(err) if err.is_transient() && attempt < self.mutation_retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, error = %err, "retrying transient store failure");
                    tokio::task::yield_now().await;
                }
                other => return other,
            }
        }
    }
}

/// Spawn `fut` and wait for it. The task keeps running if the caller is dropped.
pub(crate) async fn run_to_completion<T, Fut>(op: &'static str, fut: Fut) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|err| StoreError::Internal(format!("{op} task failed: {err}")))?
}
