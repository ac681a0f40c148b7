use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

use super::snapshot::{SyncSnapshot, SyncSource};
use crate::config::SyncConfig;
use crate::notify::Subscription;

/// Per-viewer cache kept current by resyncing on change signals.
///
/// A signal opens a coalescing window; every further signal inside it is
/// absorbed, then one full resync runs. Transient failures are retried with
/// exponential backoff; when retries run out the cache is marked stale and
/// the next signal tries again.
#[derive(Debug)]
pub struct SyncClient {
    state: watch::Receiver<SyncSnapshot>,
    resyncs: Arc<AtomicU64>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Run the initial resync, then keep resyncing in the background on
    /// every signal from `subscription`.
    ///
    /// Never fails: if the initial resync fails the client starts stale.
    pub async fn start(source: SyncSource, subscription: Subscription, config: SyncConfig) -> Self {
        let resyncs = Arc::new(AtomicU64::new(0));
        let (tx, rx) = watch::channel(SyncSnapshot::default());
        let worker = Worker {
            source,
            config,
            state: tx,
            resyncs: Arc::clone(&resyncs),
        };

        worker.resync().await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(worker.run(subscription, stop_rx));

        Self {
            state: rx,
            resyncs,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Current cached view.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that changes after every resync attempt.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SyncSnapshot> {
        self.state.clone()
    }

    /// Resync attempts so far, including the initial one.
    #[must_use]
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.state.borrow().stale
    }

    /// Stop the background task and drop the subscription. A resync already
    /// running finishes first.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "sync task ended abnormally");
            }
        }
    }
}

struct Worker {
    source: SyncSource,
    config: SyncConfig,
    state: watch::Sender<SyncSnapshot>,
    resyncs: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self, mut subscription: Subscription, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                signal = subscription.recv() => {
                    let Some(first) = signal else {
                        tracing::debug!("notifier closed, sync task exiting");
                        break;
                    };

                    let deadline = Instant::now() + self.config.coalesce_window();
                    let mut absorbed = 0_usize;
                    let mut closed = false;
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut stop => return,
                            () = sleep_until(deadline) => break,
                            more = subscription.recv() => match more {
                                Some(_) => absorbed += 1,
                                None => {
                                    closed = true;
                                    break;
                                }
                            },
                        }
                    }
                    tracing::debug!(topic = %first, absorbed, "coalesced change signals");

                    self.resync().await;
                    if closed {
                        break;
                    }
                }
            }
        }
        tracing::debug!(subscription = ?subscription.id(), "sync task stopped");
    }

    /// One resync attempt with bounded retries. Publishes the result either
    /// way so watchers see every attempt.
    async fn resync(&self) {
        let mut attempt = 0;
        let loaded = loop {
            match self.source.load().await {
                Ok(loaded) => break Some(loaded),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    attempt += 1;
                    tracing::debug!(attempt, delay_ms = delay.as_millis(), error = %err, "resync failed, backing off");
                    sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(attempts = attempt + 1, error = %err, "resync gave up, cache is stale");
                    break None;
                }
            }
        };

        let generation = self.resyncs.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|snapshot| {
            snapshot.generation = generation;
            match loaded {
                Some((reports, archived)) => {
                    snapshot.reports = reports;
                    snapshot.archived = archived;
                    snapshot.stale = false;
                    snapshot.synced_at = Some(Utc::now());
                }
                None => snapshot.stale = true,
            }
        });
    }
}
