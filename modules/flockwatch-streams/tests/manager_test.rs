//! End-to-end scenarios over the in-memory harness: create → schedule →
//! poll → diff → publish, plus failure backoff, auto-stop, poll locking,
//! and recovery from a cold start.
//!
//! Streams are created with a long cadence and polls are driven by hand
//! through `run_job`, except where a test exercises the real schedule.

use std::sync::Arc;
use std::time::Duration;

use browserless_pool::testing::MockFactory;
use flockwatch_common::{EventKind, StreamId, StreamKind, StreamMeta, StreamState, StreamStatus};
use flockwatch_store::{MemoryStore, StreamStore};
use flockwatch_streams::testing::{
    build_harness, harness, harness_with_config, post, snapshot, test_config, wait_for_polls,
    MockExtractor,
};
use flockwatch_streams::{DurableScheduler, JobHandler, StreamError};

// ---------------------------------------------------------------------------
// Polling and diffing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeline_stream_emits_each_post_exactly_once() {
    let h = harness(
        MockExtractor::new()
            .on_timeline(
                "acme",
                vec![
                    post("3", "acme", "c"),
                    post("2", "acme", "b"),
                    post("1", "acme", "a"),
                ],
            )
            .on_timeline(
                "acme",
                vec![
                    post("4", "acme", "d"),
                    post("3", "acme", "c"),
                    post("2", "acme", "b"),
                ],
            ),
    );
    let mut rx = h.bus.subscribe_all();

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    for _ in 0..3 {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Tweet);
        assert_eq!(event.stream_id, meta.id);
        assert_eq!(event.target, "acme");
    }

    // Second poll: only the one post that was not already seen
    h.manager.run_job(meta.id).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.data["id"], "4");
    assert!(rx.try_recv().is_err());

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.status, StreamStatus::Running);
    assert_eq!(status.poll_count, 2);
    assert_eq!(status.event_count, 4);

    match h.store.get_state(meta.id).await.unwrap().unwrap() {
        StreamState::Seen { ids } => assert_eq!(ids, vec!["4", "3", "2", "1"]),
        other => panic!("expected seen state, got {other:?}"),
    }
}

#[tokio::test]
async fn mention_stream_polls_the_mention_extractor() {
    let h = harness(MockExtractor::new().on_mentions("acme", vec![post("9", "fan", "@acme hi")]));
    let mut rx = h.bus.subscribe_all();

    let meta = h
        .manager
        .create(StreamKind::Mention, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::Mention);
    assert_eq!(event.data["author"], "fan");
    assert!(h.extractor.mention_calls() >= 1);
    assert_eq!(h.extractor.timeline_calls(), 0);
}

#[tokio::test]
async fn relationship_fast_path_skips_the_full_fetch() {
    let h = harness(
        MockExtractor::new()
            .on_count("acme", Some(2))
            .on_followers("acme", snapshot(Some(2), &["a", "b"])),
    );

    let meta = h
        .manager
        .create(StreamKind::Relationship, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;
    assert_eq!(h.extractor.follower_calls(), 1);

    // Same count as stored: the probe answers and the list is never fetched
    h.manager.run_job(meta.id).await.unwrap();

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.poll_count, 2);
    assert_eq!(status.event_count, 2);
    assert_eq!(h.extractor.follower_calls(), 1);
}

#[tokio::test]
async fn follower_churn_emits_follow_and_unfollow() {
    // Same-count churn hides behind the fast path, so the second probe is
    // unreadable, forcing the full fetch that reveals it
    let h = harness(
        MockExtractor::new()
            .on_count("acme", Some(2))
            .on_count("acme", None)
            .on_followers("acme", snapshot(Some(2), &["a", "b"]))
            .on_followers("acme", snapshot(Some(2), &["a", "c"])),
    );

    let meta = h
        .manager
        .create(StreamKind::Relationship, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    h.manager.run_job(meta.id).await.unwrap();

    let history = h.manager.get_history(meta.id, 10, None).await.unwrap();
    let unfollows: Vec<_> = history
        .iter()
        .filter(|e| e.kind == EventKind::Unfollow)
        .collect();
    assert_eq!(unfollows.len(), 1);
    assert_eq!(unfollows[0].data["handle"], "b");
    // Two follows from the seed poll, one for the newcomer
    let follows = history
        .iter()
        .filter(|e| e.kind == EventKind::Follow)
        .count();
    assert_eq!(follows, 3);

    match h.store.get_state(meta.id).await.unwrap().unwrap() {
        StreamState::Followers { handles, count } => {
            assert_eq!(handles, vec!["a", "c"]);
            assert_eq!(count, Some(2));
        }
        other => panic!("expected follower state, got {other:?}"),
    }
}

#[tokio::test]
async fn count_movement_without_churn_emits_count_change() {
    let h = harness(
        MockExtractor::new()
            .on_count("acme", Some(100))
            .on_count("acme", Some(101))
            .on_followers("acme", snapshot(Some(100), &["a", "b"]))
            .on_followers("acme", snapshot(Some(101), &["a", "b"])),
    );

    let meta = h
        .manager
        .create(StreamKind::Relationship, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    h.manager.run_job(meta.id).await.unwrap();

    let changes = h
        .manager
        .get_history(meta.id, 10, Some(EventKind::CountChange))
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].data["previous"], 100);
    assert_eq!(changes[0].data["current"], 101);
    assert_eq!(changes[0].data["delta"], 1);
}

#[tokio::test]
async fn scheduled_polls_fire_without_manual_driving() {
    let h = harness(MockExtractor::new().on_timeline("acme", vec![post("1", "acme", "a")]));

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 10)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 3).await;

    // Only the first poll saw anything new
    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.event_count, 1);
    assert_eq!(status.status, StreamStatus::Running);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_streams_are_rejected_while_active() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![])
            .on_mentions("acme", vec![]),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    let err = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::DuplicateStream { .. }));

    // A different kind on the same target is its own stream
    h.manager
        .create(StreamKind::Mention, "acme", 60_000)
        .await
        .unwrap();

    // Stopping frees the slot
    h.manager.stop(meta.id).await.unwrap();
    h.manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_deletes_everything_and_is_idempotent() {
    let h = harness(MockExtractor::new().on_timeline("acme", vec![post("1", "acme", "a")]));

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    h.manager.stop(meta.id).await.unwrap();

    assert!(h.store.get_meta(meta.id).await.unwrap().is_none());
    assert!(h.store.get_state(meta.id).await.unwrap().is_none());
    assert!(h.store.history(meta.id, 10, None).await.unwrap().is_empty());
    assert!(!h.scheduler.is_registered(meta.id).await);

    // Again, and for a stream that never existed
    h.manager.stop(meta.id).await.unwrap();
    h.manager.stop(StreamId::new()).await.unwrap();

    assert!(matches!(
        h.manager.get_status(meta.id).await.unwrap_err(),
        StreamError::UnknownStream(_)
    ));
    // An operator-stopped stream is gone for good; resume has nothing to work with
    assert!(matches!(
        h.manager.resume(meta.id).await.unwrap_err(),
        StreamError::UnknownStream(_)
    ));
}

#[tokio::test]
async fn pause_and_resume_round_trip_without_replay() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![post("1", "acme", "a")])
            .on_timeline("acme", vec![post("2", "acme", "b"), post("1", "acme", "a")]),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    let paused = h.manager.pause(meta.id).await.unwrap();
    assert_eq!(paused.status, StreamStatus::Paused);
    assert!(!h.scheduler.is_registered(meta.id).await);

    // A fire against a paused stream is inert
    h.manager.run_job(meta.id).await.unwrap();
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().poll_count, 1);

    let resumed = h.manager.resume(meta.id).await.unwrap();
    assert_eq!(resumed.status, StreamStatus::Running);
    assert!(h.scheduler.is_registered(meta.id).await);

    // Resume polls immediately and picks up where the seen set left off
    wait_for_polls(&h.manager, meta.id, 2).await;
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().event_count, 2);
}

#[tokio::test]
async fn transitions_from_the_wrong_status_are_rejected() {
    let h = harness(MockExtractor::new().on_timeline("acme", vec![]));

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    assert!(matches!(
        h.manager.resume(meta.id).await.unwrap_err(),
        StreamError::InvalidTransition {
            action: "resume",
            ..
        }
    ));

    h.manager.pause(meta.id).await.unwrap();
    assert!(matches!(
        h.manager.pause(meta.id).await.unwrap_err(),
        StreamError::InvalidTransition { action: "pause", .. }
    ));

    assert!(matches!(
        h.manager.pause(StreamId::new()).await.unwrap_err(),
        StreamError::UnknownStream(_)
    ));
}

#[tokio::test]
async fn cadence_is_clamped_and_persisted() {
    let h = harness(MockExtractor::new().on_timeline("acme", vec![]));

    // Below the floor at creation
    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 1)
        .await
        .unwrap();
    assert_eq!(meta.cadence_ms, 10);

    // Above the ceiling on update
    let updated = h.manager.update_cadence(meta.id, u64::MAX).await.unwrap();
    assert_eq!(updated.cadence_ms, 86_400_000);
    let stored = h.store.get_meta(meta.id).await.unwrap().unwrap();
    assert_eq!(stored.cadence_ms, 86_400_000);
    assert!(h.scheduler.is_registered(meta.id).await);

    // Updating a paused stream must not revive its job
    h.manager.pause(meta.id).await.unwrap();
    h.manager.update_cadence(meta.id, 50_000).await.unwrap();
    assert!(!h.scheduler.is_registered(meta.id).await);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_polls_back_off_and_recover() {
    let mut config = test_config();
    config.backoff_ceiling_ms = 100;
    let h = harness_with_config(
        config,
        MockExtractor::new()
            .on_timeline_error("acme", "render timed out")
            .on_timeline("acme", vec![post("1", "acme", "a")]),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.status, StreamStatus::Backoff);
    assert_eq!(status.consecutive_errors, 1);
    assert_eq!(status.error_count, 1);
    assert!(status.backoff_until.is_some());
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("render timed out"));

    // Inside the backoff window the fire is skipped without counting
    h.manager.run_job(meta.id).await.unwrap();
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().poll_count, 1);

    // After the window the next poll runs and clears the error slate
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.manager.run_job(meta.id).await.unwrap();

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.status, StreamStatus::Running);
    assert_eq!(status.consecutive_errors, 0);
    assert!(status.backoff_until.is_none());
    assert!(status.last_error.is_none());
    assert_eq!(status.poll_count, 2);
    assert_eq!(status.error_count, 1);
}

#[tokio::test]
async fn stream_auto_stops_after_too_many_consecutive_failures() {
    let mut config = test_config();
    config.max_consecutive_errors = 3;
    config.backoff_ceiling_ms = 20;
    let h = harness_with_config(config, MockExtractor::new().failing());

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    // One failure short of the limit the stream is still only backing off
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.manager.run_job(meta.id).await.unwrap();
    assert_eq!(
        h.manager.get_status(meta.id).await.unwrap().status,
        StreamStatus::Backoff
    );

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.manager.run_job(meta.id).await.unwrap();

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.status, StreamStatus::Stopped);
    assert_eq!(status.consecutive_errors, 3);
    assert!(status.backoff_until.is_none());
    assert!(!h.scheduler.is_registered(meta.id).await);

    // The stopped stream ignores further fires
    let calls = h.extractor.timeline_calls();
    h.manager.run_job(meta.id).await.unwrap();
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().poll_count, 3);
    assert_eq!(h.extractor.timeline_calls(), calls);

    // And no longer blocks a replacement
    h.manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
}

#[tokio::test]
async fn auto_stopped_stream_keeps_its_meta_and_resumes() {
    let mut config = test_config();
    config.max_consecutive_errors = 1;
    let h = harness_with_config(
        config,
        MockExtractor::new()
            .on_timeline_error("acme", "boom")
            .on_timeline("acme", vec![post("1", "acme", "a")]),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;
    assert_eq!(
        h.manager.get_status(meta.id).await.unwrap().status,
        StreamStatus::Stopped
    );

    let resumed = h.manager.resume(meta.id).await.unwrap();
    assert_eq!(resumed.status, StreamStatus::Running);
    assert_eq!(resumed.consecutive_errors, 0);
    assert!(resumed.last_error.is_none());
    assert!(h.scheduler.is_registered(meta.id).await);

    wait_for_polls(&h.manager, meta.id, 2).await;
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().event_count, 1);
}

#[tokio::test]
async fn pool_exhaustion_is_a_poll_failure_not_a_stop() {
    let mut config = test_config();
    config.acquire_timeout = Duration::from_millis(50);
    let h = build_harness(
        config,
        MockExtractor::new().on_timeline("acme", vec![]),
        Arc::new(MemoryStore::new()),
        Arc::new(MockFactory::new().fail_next(10)),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    let status = h.manager.get_status(meta.id).await.unwrap();
    assert_eq!(status.status, StreamStatus::Backoff);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("worker acquisition failed"));
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_fires_skip_instead_of_overlapping() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![post("1", "acme", "a")])
            .with_delay(Duration::from_millis(100)),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let manager = h.manager.clone();
        let id = meta.id;
        tasks.push(tokio::spawn(async move { manager.run_job(id).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // One winner polled; the rest hit the lock and walked away
    assert_eq!(h.manager.get_status(meta.id).await.unwrap().poll_count, 2);
    let stats = h.manager.get_stats().await;
    assert_eq!(stats.lock_contentions, 3);
}

#[tokio::test]
async fn stopping_mid_poll_discards_the_result() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![post("1", "acme", "a")])
            .with_delay(Duration::from_millis(80)),
    );
    let mut rx = h.bus.subscribe_all();

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();

    // Let the initial poll enter the extractor, then pull the stream out
    // from under it
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.manager.stop(meta.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(rx.try_recv().is_err());
    assert!(h.store.get_meta(meta.id).await.unwrap().is_none());
    assert!(h.store.get_state(meta.id).await.unwrap().is_none());
    assert!(h.store.history(meta.id, 10, None).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_bounded_newest_first_and_filterable() {
    let mut config = test_config();
    config.history_cap = 3;
    let h = harness_with_config(
        config,
        MockExtractor::new()
            .on_timeline("acme", vec![post("1", "acme", "a")])
            .on_timeline("acme", vec![post("2", "acme", "b"), post("1", "acme", "a")])
            .on_timeline("acme", vec![post("3", "acme", "c"), post("2", "acme", "b")])
            .on_timeline("acme", vec![post("4", "acme", "d"), post("3", "acme", "c")])
            .on_timeline("acme", vec![post("5", "acme", "e"), post("4", "acme", "d")]),
    );

    let meta = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, meta.id, 1).await;
    for _ in 0..4 {
        h.manager.run_job(meta.id).await.unwrap();
    }

    let history = h.manager.get_history(meta.id, 10, None).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].data["id"], "5");
    assert_eq!(history[1].data["id"], "4");
    assert_eq!(history[2].data["id"], "3");

    let one = h.manager.get_history(meta.id, 1, None).await.unwrap();
    assert_eq!(one.len(), 1);

    let mentions = h
        .manager
        .get_history(meta.id, 10, Some(EventKind::Mention))
        .await
        .unwrap();
    assert!(mentions.is_empty());

    assert!(matches!(
        h.manager.get_history(StreamId::new(), 10, None).await.unwrap_err(),
        StreamError::UnknownStream(_)
    ));
}

// ---------------------------------------------------------------------------
// Recovery and introspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restore_rebuilds_jobs_for_running_and_backoff_streams() {
    let kv = Arc::new(MemoryStore::new());
    let seed = StreamStore::new(kv.clone(), Duration::from_secs(3600), Duration::from_secs(5));

    let running = StreamMeta::new(StreamKind::Timeline, "acme", 60_000);
    let mut paused = StreamMeta::new(StreamKind::Mention, "globex", 60_000);
    paused.status = StreamStatus::Paused;
    let mut backed_off = StreamMeta::new(StreamKind::Relationship, "initech", 60_000);
    backed_off.status = StreamStatus::Backoff;

    seed.put_meta(&running).await.unwrap();
    seed.put_meta(&paused).await.unwrap();
    seed.put_meta(&backed_off).await.unwrap();

    let h = build_harness(
        test_config(),
        MockExtractor::new(),
        kv,
        Arc::new(MockFactory::new()),
    );
    let restored = h.manager.restore().await.unwrap();
    assert_eq!(restored, 2);

    assert!(h.scheduler.is_registered(running.id).await);
    assert!(h.scheduler.is_registered(backed_off.id).await);
    assert!(!h.scheduler.is_registered(paused.id).await);

    let all = h.manager.list().await;
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn uniqueness_holds_across_a_cold_start() {
    let kv = Arc::new(MemoryStore::new());
    let seed = StreamStore::new(kv.clone(), Duration::from_secs(3600), Duration::from_secs(5));
    let prior = StreamMeta::new(StreamKind::Timeline, "acme", 60_000);
    seed.put_meta(&prior).await.unwrap();

    // Fresh process over the same store, no explicit restore
    let h = build_harness(
        test_config(),
        MockExtractor::new(),
        kv,
        Arc::new(MockFactory::new()),
    );
    let err = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::DuplicateStream { .. }));

    assert_eq!(h.manager.list().await.len(), 1);
}

#[tokio::test]
async fn per_stream_subscriptions_see_only_their_stream() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![post("1", "acme", "a")])
            .on_timeline("acme", vec![post("2", "acme", "b"), post("1", "acme", "a")])
            .on_timeline("globex", vec![post("9", "globex", "z")])
            .on_timeline(
                "globex",
                vec![post("10", "globex", "y"), post("9", "globex", "z")],
            ),
    );

    let a = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    let b = h
        .manager
        .create(StreamKind::Timeline, "globex", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, a.id, 1).await;
    wait_for_polls(&h.manager, b.id, 1).await;

    let mut rx_a = h.bus.subscribe_stream(a.id).await;
    h.manager.run_job(a.id).await.unwrap();
    h.manager.run_job(b.id).await.unwrap();

    let event = rx_a.recv().await.unwrap();
    assert_eq!(event.stream_id, a.id);
    assert_eq!(event.data["id"], "2");
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn stats_count_streams_by_status() {
    let h = harness(
        MockExtractor::new()
            .on_timeline("acme", vec![])
            .on_mentions("globex", vec![]),
    );

    let a = h
        .manager
        .create(StreamKind::Timeline, "acme", 60_000)
        .await
        .unwrap();
    let b = h
        .manager
        .create(StreamKind::Mention, "globex", 60_000)
        .await
        .unwrap();
    wait_for_polls(&h.manager, a.id, 1).await;
    wait_for_polls(&h.manager, b.id, 1).await;
    h.manager.pause(b.id).await.unwrap();

    let stats = h.manager.get_stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.paused, 1);
    assert_eq!(stats.backoff, 0);
    assert_eq!(stats.stopped, 0);
    assert_eq!(stats.lock_contentions, 0);
    assert!(stats.pool.workers >= 1);
}

#[tokio::test]
async fn health_follows_the_store_and_the_pool() {
    let h = harness(MockExtractor::new());
    assert!(h.manager.is_healthy().await);

    h.pool.close().await;
    assert!(!h.manager.is_healthy().await);
}
