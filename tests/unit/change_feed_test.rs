//! Tests for the polling change feed: it notices rows written elsewhere,
//! stays quiet while nothing changes, and stops when unsubscribed.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{record, ScriptedRecordService};
use smartmarks::services::change_feed::{ChangeFeed, LocalChangeFeed, PollingChangeFeed};
use smartmarks::types::events::SyncEvent;

const EVERY: Duration = Duration::from_millis(10);

fn polling(records: Arc<ScriptedRecordService>, every: Duration) -> (PollingChangeFeed, LocalChangeFeed) {
    let local = LocalChangeFeed::new();
    (PollingChangeFeed::new(records, local.clone(), every), local)
}

async fn until_listed(records: &ScriptedRecordService, count: usize) {
    timeout(Duration::from_secs(2), async {
        while records.list_count() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("feed never polled");
}

#[tokio::test]
async fn test_rows_written_elsewhere_are_noticed() {
    let records = Arc::new(ScriptedRecordService::with_rows(vec![record("a", "alice", 0)]));
    let (feed, _local) = polling(records.clone(), EVERY);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = feed.subscribe("alice", tx);

    // The first poll only records what is there.
    until_listed(&records, 1).await;
    records.set_rows(vec![record("a", "alice", 0), record("b", "alice", 1)]);

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        event,
        SyncEvent::RecordsChanged {
            owner_id: "alice".to_string()
        }
    );
}

#[tokio::test]
async fn test_unchanged_rows_stay_quiet() {
    let records = Arc::new(ScriptedRecordService::with_rows(vec![record("a", "alice", 0)]));
    let (feed, _local) = polling(records.clone(), EVERY);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = feed.subscribe("alice", tx);

    until_listed(&records, 3).await;
    // Another owner's rows do not show up in alice's listing.
    records.set_rows(vec![record("a", "alice", 0), record("z", "bob", 5)]);
    until_listed(&records, 6).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_local_writes_arrive_through_the_wrapped_feed() {
    let records = Arc::new(ScriptedRecordService::default());
    let (feed, local) = polling(records, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = feed.subscribe("alice", tx);

    assert_eq!(local.publish("alice"), 1);
    assert_eq!(
        rx.try_recv().unwrap(),
        SyncEvent::RecordsChanged {
            owner_id: "alice".to_string()
        }
    );
}

#[tokio::test]
async fn test_cancelled_subscription_stops_polling() {
    let records = Arc::new(ScriptedRecordService::default());
    let (feed, local) = polling(records.clone(), EVERY);
    let (tx, _rx) = mpsc::unbounded_channel();
    let sub = feed.subscribe("alice", tx);
    until_listed(&records, 2).await;

    sub.cancel();
    assert_eq!(local.subscriber_count(), 0);
    let stopped_at = records.list_count();
    tokio::time::sleep(EVERY * 5).await;
    assert_eq!(records.list_count(), stopped_at);
}

#[tokio::test]
async fn test_zero_interval_never_polls() {
    let records = Arc::new(ScriptedRecordService::default());
    let (feed, local) = polling(records.clone(), Duration::ZERO);
    let (tx, _rx) = mpsc::unbounded_channel();
    let _sub = feed.subscribe("alice", tx);

    tokio::time::sleep(EVERY * 5).await;
    assert_eq!(records.list_count(), 0);
    assert_eq!(local.subscriber_count(), 1);
}

#[test]
fn test_subscribe_outside_a_runtime_falls_back_to_local_changes() {
    let records = Arc::new(ScriptedRecordService::default());
    let (feed, local) = polling(records.clone(), EVERY);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = feed.subscribe("alice", tx);

    local.publish("alice");
    assert!(rx.try_recv().is_ok());
    assert_eq!(records.list_count(), 0);
}
