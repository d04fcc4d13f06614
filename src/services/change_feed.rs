//! Change Feed contract, the in-process feed, and the polling feed.
//!
//! A feed signals that some row owned by a user changed; it never carries
//! the row. Subscribers react by re-fetching.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::services::listeners::ListenerSet;
use crate::services::record_service::RecordService;
use crate::types::bookmark::BookmarkRecord;
use crate::types::events::{EventSender, Subscription, SyncEvent};

pub trait ChangeFeed: Send + Sync {
    /// Delivers `SyncEvent::RecordsChanged` to `sender` for rows owned by `owner_id`.
    fn subscribe(&self, owner_id: &str, sender: EventSender) -> Subscription;

    fn unsubscribe(&self, subscription: Subscription) {
        subscription.cancel();
    }
}

/// Feed fanned out inside the process.
///
/// Record services publish after each successful mutation, so every
/// controller in the process observes writes made by any of them.
#[derive(Clone, Default)]
pub struct LocalChangeFeed {
    listeners: ListenerSet,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals a change to `owner_id`'s rows. Returns how many subscribers were told.
    pub fn publish(&self, owner_id: &str) -> usize {
        let event = SyncEvent::RecordsChanged {
            owner_id: owner_id.to_string(),
        };
        let delivered = self.listeners.notify_scope(owner_id, &event);
        debug!(owner_id, delivered, "change feed published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ChangeFeed for LocalChangeFeed {
    fn subscribe(&self, owner_id: &str, sender: EventSender) -> Subscription {
        debug!(owner_id, "change feed subscription opened");
        self.listeners
            .register(&format!("bookmarks-{}", owner_id), Some(owner_id.to_string()), sender)
    }
}

/// Feed that watches the record service itself.
///
/// Each subscription starts a task that lists the owner's rows every
/// `interval` and signals when the result differs from the previous poll,
/// so rows written by other clients are noticed. Writes made through this
/// process arrive at once through the wrapped local feed. A zero interval
/// turns polling off.
#[derive(Clone)]
pub struct PollingChangeFeed {
    records: Arc<dyn RecordService>,
    local: LocalChangeFeed,
    interval: Duration,
}

impl PollingChangeFeed {
    pub fn new(records: Arc<dyn RecordService>, local: LocalChangeFeed, interval: Duration) -> Self {
        Self {
            records,
            local,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl ChangeFeed for PollingChangeFeed {
    fn subscribe(&self, owner_id: &str, sender: EventSender) -> Subscription {
        let local = self.local.subscribe(owner_id, sender.clone());
        let poller = if self.interval.is_zero() {
            None
        } else {
            match Handle::try_current() {
                Ok(runtime) => Some(runtime.spawn(poll_owner(
                    self.records.clone(),
                    owner_id.to_string(),
                    self.interval,
                    sender,
                ))),
                Err(_) => {
                    warn!(owner_id, "no async runtime; remote changes will not be polled");
                    None
                }
            }
        };

        let id = format!("poll-{}", local.id());
        Subscription::new(id, move || {
            if let Some(task) = poller {
                task.abort();
            }
            local.cancel();
        })
    }
}

async fn poll_owner(
    records: Arc<dyn RecordService>,
    owner_id: String,
    every: Duration,
    sender: EventSender,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen: Option<Vec<BookmarkRecord>> = None;
    debug!(owner_id, every_ms = every.as_millis() as u64, "change polling started");

    loop {
        ticker.tick().await;
        if sender.is_closed() {
            break;
        }
        match records.list(&owner_id).await {
            Ok(rows) => {
                let changed = last_seen.as_ref().map_or(false, |previous| *previous != rows);
                last_seen = Some(rows);
                if changed {
                    debug!(owner_id, "remote change detected");
                    let event = SyncEvent::RecordsChanged {
                        owner_id: owner_id.clone(),
                    };
                    if sender.send(event).is_err() {
                        break;
                    }
                }
            }
            // The next tick tries again.
            Err(err) => debug!(owner_id, error = %err, "change poll failed"),
        }
    }
    debug!(owner_id, "change polling stopped");
}
