use std::fmt;

use tokio::sync::mpsc;

use super::session::Session;

/// Messages pushed into a sync controller by its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The session store observed a sign-in, refresh, sign-out or expiry.
    SessionChanged(Option<Session>),
    /// A row owned by `owner_id` was inserted, updated or deleted.
    RecordsChanged { owner_id: String },
}

/// Sending half of a controller's event channel.
pub type EventSender = mpsc::UnboundedSender<SyncEvent>;

/// Receiving half of a controller's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<SyncEvent>;

/// Handle to a live listener registration.
///
/// The listener is released by `cancel()` or when the handle is dropped,
/// whichever comes first.
pub struct Subscription {
    id: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: id.into(),
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            release: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}
