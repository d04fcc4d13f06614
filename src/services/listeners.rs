//! Listener registry shared by the session stores and the local change feed.
//!
//! Each registration holds the sending half of a controller's event channel
//! and an optional scope (the owner id a change-feed listener filters on).
//! Registrations are removed when their [`Subscription`] is released, and
//! senders whose receiver is gone are pruned on the next notify.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::types::events::{EventSender, Subscription, SyncEvent};

struct Listener {
    scope: Option<String>,
    sender: EventSender,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, Listener>,
}

#[derive(Clone, Default)]
pub struct ListenerSet {
    registry: Arc<Mutex<Registry>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sender`. `scope = None` receives every notification.
    pub fn register(&self, label: &str, scope: Option<String>, sender: EventSender) -> Subscription {
        let id = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.next_id += 1;
            let id = registry.next_id;
            registry.entries.insert(id, Listener { scope, sender });
            id
        };

        let weak: Weak<Mutex<Registry>> = Arc::downgrade(&self.registry);
        Subscription::new(format!("{}-{}", label, id), move || {
            if let Some(registry) = weak.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .remove(&id);
            }
        })
    }

    /// Sends `event` to every listener. Returns how many received it.
    pub fn notify_all(&self, event: &SyncEvent) -> usize {
        self.notify_where(event, |_| true)
    }

    /// Sends `event` to unscoped listeners and to listeners scoped to `scope`.
    pub fn notify_scope(&self, scope: &str, event: &SyncEvent) -> usize {
        self.notify_where(event, |listener| {
            listener.scope.as_deref().map_or(true, |s| s == scope)
        })
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_where(&self, event: &SyncEvent, matches: impl Fn(&Listener) -> bool) -> usize {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        registry.entries.retain(|_, listener| {
            if !matches(listener) {
                return true;
            }
            match listener.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }
}
