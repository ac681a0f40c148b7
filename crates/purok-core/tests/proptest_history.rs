use chrono::Utc;
use proptest::prelude::*;
use purok_core::backend::IngestOutcome;
use purok_core::config::TrackerConfig;
use purok_core::model::NewStatusEvent;
use purok_core::reconcile;
use purok_core::{Actor, AppendRequest, EventId, ReportDraft, Status, StatusEvent, Tracker};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Pending),
        Just(Status::InProgress),
        Just(Status::Resolved),
    ]
}

fn permissive() -> TrackerConfig {
    let mut config = TrackerConfig::default();
    config.policy.allow_post_resolution_edits = true;
    config.policy.require_progress_response = false;
    config
}

async fn submit(tracker: &Tracker) -> purok_core::ReportId {
    tracker
        .reports()
        .submit(&Actor::resident("resident-1"), ReportDraft::new("Pothole", "Near the chapel"))
        .await
        .expect("submit")
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    /// Whatever order events arrive in, the latest is the highest sequence
    /// and redelivery changes nothing.
    #[test]
    fn ingest_order_never_changes_latest(
        entries in prop::collection::btree_map(1_u64..10_000, arb_status(), 1..24)
            .prop_flat_map(|m| {
                let v: Vec<(u64, Status)> = m.into_iter().collect();
                Just(v).prop_shuffle()
            })
    ) {
        runtime().block_on(async {
            let tracker = Tracker::in_memory(TrackerConfig::default());
            let id = submit(&tracker).await;
            let upstream = Actor::official("upstream");

            let events: Vec<StatusEvent> = entries
                .iter()
                .map(|(sequence, status)| {
                    NewStatusEvent {
                        report_id: id.clone(),
                        status: *status,
                        official_response: None,
                        updated_by: Some("upstream".into()),
                        location: None,
                        updated_at: Utc::now(),
                    }
                    .assign(EventId::generate(), *sequence)
                })
                .collect();

            for event in &events {
                prop_assert_eq!(
                    tracker.status_log().ingest(&upstream, event.clone()).await.expect("ingest"),
                    IngestOutcome::Inserted
                );
            }
            for event in events.iter().rev() {
                prop_assert_eq!(
                    tracker.status_log().ingest(&upstream, event.clone()).await.expect("redeliver"),
                    IngestOutcome::Duplicate
                );
            }

            let expected = StatusEvent::latest(&events).cloned();
            let latest = tracker.status_log().latest_for(&id).await.expect("latest");
            prop_assert_eq!(&latest, &expected);

            let history = tracker.status_log().history(&id).await.expect("history");
            prop_assert_eq!(history.len(), events.len());
            prop_assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));

            let report = tracker.reports().get(&id).await.expect("get");
            prop_assert_eq!(
                reconcile::effective_status(&report, latest.as_ref()),
                expected.map_or(Status::Pending, |e| e.status)
            );
            prop_assert_eq!(report.status_sequence, latest.map_or(0, |e| e.sequence));
            Ok(())
        })?;
    }

    /// Appends, accepted or rejected, never shorten or rewrite history.
    #[test]
    fn history_only_grows(statuses in prop::collection::vec(arb_status(), 1..16), strict in any::<bool>()) {
        runtime().block_on(async {
            let config = if strict { TrackerConfig::default() } else { permissive() };
            let tracker = Tracker::in_memory(config);
            let id = submit(&tracker).await;
            let official = Actor::official("official-1");

            let mut previous: Vec<StatusEvent> = Vec::new();
            for status in statuses {
                let request = AppendRequest::new(id.clone(), status).with_response("noted");
                let accepted = tracker.status_log().append_event(&official, request).await.is_ok();

                let history = tracker.status_log().history(&id).await.expect("history");
                prop_assert!(history.len() >= previous.len());
                prop_assert_eq!(&history[..previous.len()], previous.as_slice());
                prop_assert_eq!(history.len(), previous.len() + usize::from(accepted));
                previous = history;
            }

            let report = tracker.reports().get(&id).await.expect("get");
            let effective = tracker.reconciler().effective_status(&report).await;
            prop_assert!(Status::ALL.contains(&effective));
            Ok(())
        })?;
    }
}
