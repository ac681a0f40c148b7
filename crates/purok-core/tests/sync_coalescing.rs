//! Sync client tests on paused time:
//! - a burst of signals inside the coalescing window causes one resync
//! - bursts further apart than the window each cause a resync
//! - transient failures are retried with backoff; exhaustion marks the cache
//!   stale and keeps the last good data
//! - an unreadable status log is a failed resync, not a cached fallback
//! - shutdown cancels the subscription

use std::sync::Arc;
use std::time::Duration;

use purok_core::backend::{BackendOp, FaultyBackend, MemoryBackend};
use purok_core::config::TrackerConfig;
use purok_core::{Actor, AppendRequest, ReportDraft, Status, Topic, Tracker};
use tokio::time::sleep;

fn faulty_tracker() -> (Tracker, Arc<FaultyBackend>) {
    let faulty = Arc::new(FaultyBackend::new(Arc::new(MemoryBackend::new())));
    let tracker = Tracker::new(faulty.clone(), TrackerConfig::default());
    (tracker, faulty)
}

#[tokio::test(start_paused = true)]
async fn ten_signals_in_fifty_ms_cause_one_resync() {
    let tracker = Tracker::in_memory(TrackerConfig::default());
    let client = tracker.sync_client().await;
    assert_eq!(client.resync_count(), 1, "initial resync");

    for _ in 0..10 {
        tracker.notifier().publish(Topic::Reports);
        sleep(Duration::from_millis(5)).await;
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(client.resync_count(), 2);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn separated_bursts_each_resync() {
    let tracker = Tracker::in_memory(TrackerConfig::default());
    let client = tracker.sync_client().await;

    for _ in 0..3 {
        tracker.notifier().publish(Topic::Status);
        tracker.notifier().publish(Topic::Archive);
        sleep(Duration::from_millis(300)).await;
    }

    assert_eq!(client.resync_count(), 4);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_follows_mutations() {
    let tracker = Tracker::in_memory(TrackerConfig::default());
    let client = tracker.sync_client().await;
    assert!(client.snapshot().reports.is_empty());

    let mut watch = client.watch();
    watch.borrow_and_update();

    let id = tracker
        .reports()
        .submit(
            &Actor::resident("resident-1"),
            ReportDraft::new("Overflowing bin", "Corner of Rizal St").with_location("Purok 3"),
        )
        .await
        .expect("submit");
    tracker
        .status_log()
        .append_event(
            &Actor::official("official-1"),
            AppendRequest::new(id.clone(), Status::InProgress).with_response("On the way"),
        )
        .await
        .expect("append");

    watch.changed().await.expect("resync published");
    let snapshot = watch.borrow_and_update().clone();
    assert_eq!(snapshot.reports.len(), 1);
    assert_eq!(snapshot.reports[0].report.id, id);
    assert_eq!(snapshot.reports[0].status, Status::InProgress);
    assert_eq!(snapshot.reports[0].official_response.as_deref(), Some("On the way"));
    assert_eq!(snapshot.count_by_status(Status::InProgress), 1);
    assert!(!snapshot.stale);
    assert!(snapshot.synced_at.is_some());
    assert_eq!(client.resync_count(), 2, "submit and append coalesce");

    let record = tracker
        .archive()
        .archive(&Actor::official("official-1"), &id)
        .await
        .expect("archive");
    watch.changed().await.expect("resync published");
    let snapshot = client.snapshot();
    assert!(snapshot.reports.is_empty());
    assert_eq!(snapshot.archived.len(), 1);
    assert_eq!(snapshot.archived[0].id, record.id);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let (tracker, faulty) = faulty_tracker();
    let client = tracker.sync_client().await;
    let before = faulty.calls(BackendOp::ListReports);

    faulty.fail_next(BackendOp::ListReports, 2);
    tracker.notifier().publish(Topic::Reports);
    sleep(Duration::from_secs(2)).await;

    assert_eq!(faulty.calls(BackendOp::ListReports) - before, 3);
    assert_eq!(client.resync_count(), 2);
    assert!(!client.is_stale());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_stale_and_keep_last_data() {
    let (tracker, faulty) = faulty_tracker();
    tracker
        .reports()
        .submit(&Actor::resident("resident-1"), ReportDraft::new("Pothole", "Near the chapel"))
        .await
        .expect("submit");

    let client = tracker.sync_client().await;
    assert_eq!(client.snapshot().reports.len(), 1);

    faulty.fail_always(BackendOp::ListReports);
    tracker.notifier().publish(Topic::Reports);
    sleep(Duration::from_secs(5)).await;

    let snapshot = client.snapshot();
    assert!(snapshot.stale);
    assert_eq!(snapshot.reports.len(), 1, "last good data kept");
    assert_eq!(snapshot.generation, 2);

    faulty.heal();
    tracker.notifier().publish(Topic::Reports);
    sleep(Duration::from_secs(1)).await;
    assert!(!client.is_stale());
    assert_eq!(client.resync_count(), 3);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unreadable_log_marks_stale_instead_of_showing_cache() {
    let (tracker, faulty) = faulty_tracker();
    let official = Actor::official("official-1");
    let id = tracker
        .reports()
        .submit(&Actor::resident("resident-1"), ReportDraft::new("Flooded lane", "Knee deep"))
        .await
        .expect("submit");
    tracker
        .status_log()
        .append_event(&official, AppendRequest::new(id.clone(), Status::InProgress).with_response("Pump requested"))
        .await
        .expect("progress");
    faulty.fail_next(BackendOp::RefreshCachedStatus, 1);
    tracker
        .status_log()
        .append_event(&official, AppendRequest::new(id.clone(), Status::Resolved))
        .await
        .expect("resolve");
    let cached = tracker.reports().get(&id).await.expect("get");
    assert_eq!(cached.status, Status::InProgress, "cache refresh was dropped");

    let client = tracker.sync_client().await;
    assert_eq!(client.snapshot().reports[0].status, Status::Resolved);

    faulty.fail_always(BackendOp::LatestEvents);
    tracker.notifier().publish(Topic::Status);
    sleep(Duration::from_secs(5)).await;

    let snapshot = client.snapshot();
    assert!(snapshot.stale);
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.reports[0].status, Status::Resolved, "last good data kept");

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn initial_failure_starts_stale() {
    let (tracker, faulty) = faulty_tracker();
    faulty.fail_always(BackendOp::ListArchives);

    let client = tracker.sync_client().await;
    assert!(client.is_stale());
    assert_eq!(client.resync_count(), 1);
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_unsubscribes() {
    let tracker = Tracker::in_memory(TrackerConfig::default());
    let client = tracker.sync_client().await;
    assert_eq!(tracker.notifier().subscriber_count(), 1);

    client.shutdown().await;
    assert_eq!(tracker.notifier().subscriber_count(), 0);
    assert_eq!(tracker.notifier().publish(Topic::Reports), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_client_stops_task() {
    let tracker = Tracker::in_memory(TrackerConfig::default());
    let client = tracker.sync_client().await;
    drop(client);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(tracker.notifier().subscriber_count(), 0);
}
