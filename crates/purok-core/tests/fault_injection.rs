//! Fault-injection tests for the two-step archive and restore paths:
//! - a transient delete failure is retried and the operation succeeds
//! - a persistent delete failure is compensated and surfaces StoreUnavailable
//! - a failed compensation surfaces PartialFailure and verify reports it
//! - a failed cache refresh never fails the append
//! - a failed log read degrades the reconciler to the cached status

use std::sync::Arc;

use purok_core::backend::{BackendOp, FaultyBackend, MemoryBackend};
use purok_core::config::TrackerConfig;
use purok_core::error::ErrorCode;
use purok_core::verify::Violation;
use purok_core::{Actor, AppendRequest, ReportDraft, ReportId, Status, StoreError, Tracker};

fn official() -> Actor {
    Actor::official("official-1")
}

async fn setup() -> (Tracker, Arc<FaultyBackend>, ReportId) {
    let faulty = Arc::new(FaultyBackend::new(Arc::new(MemoryBackend::new())));
    let tracker = Tracker::new(faulty.clone(), TrackerConfig::default());
    let id = tracker
        .reports()
        .submit(
            &Actor::resident("resident-1"),
            ReportDraft::new("Overflowing bin", "Corner of Rizal St").with_location("Purok 3"),
        )
        .await
        .expect("submit");
    (tracker, faulty, id)
}

#[tokio::test]
async fn archive_retries_transient_delete() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_next(BackendOp::DeleteReport, 2);

    let record = tracker.archive().archive(&official(), &id).await.expect("archive");
    assert_eq!(faulty.calls(BackendOp::DeleteReport), 3);
    assert_eq!(record.report_id, id);
    assert!(tracker.reports().get_active().await.expect("active").is_empty());
    assert!(tracker.verify().await.expect("verify").is_ok());
}

#[tokio::test]
async fn archive_compensates_when_delete_keeps_failing() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_always(BackendOp::DeleteReport);

    let err = tracker.archive().archive(&official(), &id).await.expect_err("delete fails");
    assert!(matches!(err, StoreError::StoreUnavailable(_)));

    faulty.heal();
    assert!(tracker.archive().list().await.expect("list").is_empty(), "snapshot undone");
    assert_eq!(tracker.reports().get_active().await.expect("active").len(), 1);
    assert!(tracker.verify().await.expect("verify").is_ok());
}

#[tokio::test]
async fn archive_partial_failure_when_compensation_fails() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_always(BackendOp::DeleteReport);
    faulty.fail_always(BackendOp::DeleteArchive);

    let err = tracker.archive().archive(&official(), &id).await.expect_err("both fail");
    assert_eq!(err.code(), ErrorCode::PartialFailure);
    assert!(err.to_string().contains(id.as_str()));

    faulty.heal();
    let report = tracker.verify().await.expect("verify");
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::ActiveAndArchived { report_id, .. }] if *report_id == id
    ));
}

#[tokio::test]
async fn restore_compensates_by_dropping_new_report() {
    let (tracker, faulty, id) = setup().await;
    let record = tracker.archive().archive(&official(), &id).await.expect("archive");

    faulty.fail_always(BackendOp::DeleteArchive);
    let err = tracker.archive().restore(&official(), &record.id).await.expect_err("restore");
    assert!(err.is_transient());

    faulty.heal();
    assert!(tracker.reports().get_active().await.expect("active").is_empty());
    assert_eq!(tracker.archive().get(&record.id).await.expect("still archived").id, record.id);
    assert!(tracker.verify().await.expect("verify").is_ok());
}

#[tokio::test]
async fn restore_partial_failure_is_detected_by_verify() {
    let (tracker, faulty, id) = setup().await;
    let record = tracker.archive().archive(&official(), &id).await.expect("archive");

    faulty.fail_always(BackendOp::DeleteArchive);
    faulty.fail_always(BackendOp::DeleteReport);
    let err = tracker.archive().restore(&official(), &record.id).await.expect_err("restore");
    assert!(matches!(err, StoreError::PartialFailure { operation: "restore", .. }));

    faulty.heal();
    let report = tracker.verify().await.expect("verify");
    assert!(
        report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::RestoredAndArchived { archive_id, .. } if *archive_id == record.id))
    );
}

#[tokio::test]
async fn failed_insert_leaves_nothing_behind() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_always(BackendOp::InsertArchive);

    let err = tracker.archive().archive(&official(), &id).await.expect_err("insert fails");
    assert!(err.is_transient());
    assert_eq!(faulty.calls(BackendOp::DeleteReport), 0);

    faulty.heal();
    assert_eq!(tracker.reports().get_active().await.expect("active").len(), 1);
    assert!(tracker.archive().list().await.expect("list").is_empty());
}

#[tokio::test]
async fn failed_cache_refresh_does_not_fail_append() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_always(BackendOp::RefreshCachedStatus);

    let event = tracker
        .status_log()
        .append_event(&official(), AppendRequest::new(id.clone(), Status::Resolved))
        .await
        .expect("append succeeds");

    faulty.heal();
    let cached = tracker.reports().get(&id).await.expect("get");
    assert_eq!(cached.status, Status::Pending, "cache was not refreshed");
    assert_eq!(tracker.reconciler().effective_status(&cached).await, Status::Resolved);

    let report = tracker.verify().await.expect("verify");
    assert!(report.is_ok());
    assert_eq!(report.lagging_caches, vec![id.clone()]);
    assert_eq!(
        tracker.status_log().latest_for(&id).await.expect("latest").map(|e| e.id),
        Some(event.id)
    );
}

#[tokio::test]
async fn failed_append_leaves_status_unchanged() {
    let (tracker, faulty, id) = setup().await;
    faulty.fail_next(BackendOp::AppendEvent, 1);

    let err = tracker
        .status_log()
        .append_event(&official(), AppendRequest::new(id.clone(), Status::Resolved))
        .await
        .expect_err("append fails");
    assert!(err.is_transient());
    assert!(tracker.status_log().history(&id).await.expect("history").is_empty());

    let report = tracker.reports().get(&id).await.expect("get");
    assert_eq!(tracker.reconciler().effective_status(&report).await, Status::Pending);
}

#[tokio::test]
async fn reconciler_falls_back_to_cache_when_log_unreadable() {
    let (tracker, faulty, id) = setup().await;
    tracker
        .status_log()
        .append_event(
            &official(),
            AppendRequest::new(id.clone(), Status::InProgress).with_response("Scheduled"),
        )
        .await
        .expect("append");

    faulty.fail_always(BackendOp::LatestEvent);
    faulty.fail_always(BackendOp::LatestEvents);
    let report = tracker.reports().get(&id).await.expect("get");
    assert_eq!(tracker.reconciler().effective_status(&report).await, Status::InProgress);

    let statuses = tracker.reconciler().effective_statuses(std::slice::from_ref(&report)).await;
    assert_eq!(statuses.get(&id), Some(&Status::InProgress));
}
