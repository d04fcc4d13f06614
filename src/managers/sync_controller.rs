//! Sync Controller for smartmarks.
//!
//! Implements `SyncControllerTrait`: owns the signed-in session and the
//! user's bookmark list, reacts to session-changed and change-feed events by
//! re-fetching, adds bookmarks once the server confirms them, and deletes
//! them optimistically with rollback when the server refuses.
//!
//! Collaborator events arrive as `SyncEvent` messages on a channel the
//! controller owns. `start()` spawns the loop that drains it; the loop only
//! holds a weak reference, so dropping the last controller handle stops it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::change_feed::ChangeFeed;
use crate::services::record_service::RecordService;
use crate::services::session_store::SessionStore;
use crate::types::bookmark::{BookmarkDraft, BookmarkList, BookmarkRecord, NewBookmark};
use crate::types::errors::{SyncError, ValidationError};
use crate::types::events::{EventReceiver, EventSender, Subscription, SyncEvent};
use crate::types::session::{AuthProvider, Session};
use crate::types::settings::AuthSettings;

/// Trait defining the user intents the presentation layer issues.
#[async_trait]
pub trait SyncControllerTrait {
    async fn sign_in(&self) -> Result<(), SyncError>;
    async fn sign_out(&self) -> Result<(), SyncError>;
    async fn add_bookmark(&self, title: &str, raw_url: &str) -> Result<BookmarkRecord, SyncError>;
    async fn delete_bookmark(&self, id: &str) -> Result<(), SyncError>;
    async fn fetch_bookmarks(&self) -> Result<(), SyncError>;
    fn snapshot(&self) -> SyncSnapshot;
}

/// The external services a controller works against.
#[derive(Clone)]
pub struct SyncCollaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub records: Arc<dyn RecordService>,
    pub feed: Arc<dyn ChangeFeed>,
}

/// How `sign_in()` asks the session store to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOptions {
    pub provider: AuthProvider,
    pub return_address: String,
}

impl Default for SignInOptions {
    fn default() -> Self {
        Self::from(&AuthSettings::default())
    }
}

impl From<&AuthSettings> for SignInOptions {
    fn from(settings: &AuthSettings) -> Self {
        Self {
            provider: settings.provider,
            return_address: settings.return_address.clone(),
        }
    }
}

/// Read-only view of controller state for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub session: Option<Session>,
    pub bookmarks: BookmarkList,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub draft: BookmarkDraft,
}

#[derive(Default)]
struct SyncState {
    session: Option<Session>,
    bookmarks: BookmarkList,
    draft: BookmarkDraft,
    last_error: Option<String>,
    adds_in_flight: usize,
    /// Bumped on every sign-in and sign-out so late responses can tell they are stale.
    epoch: u64,
    fetch_issued: u64,
    fetch_applied: u64,
}

#[derive(Default)]
struct Lifecycle {
    receiver: Option<EventReceiver>,
    event_loop: Option<JoinHandle<()>>,
    session_subscription: Option<Subscription>,
    feed_subscription: Option<Subscription>,
    started: bool,
    disposed: bool,
}

struct Inner {
    sessions: Arc<dyn SessionStore>,
    records: Arc<dyn RecordService>,
    feed: Arc<dyn ChangeFeed>,
    options: SignInOptions,
    events: EventSender,
    state: Mutex<SyncState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = lifecycle.event_loop.take() {
            handle.abort();
        }
    }
}

/// Client-side synchronization between the session store, the record
/// service and the change feed. Cloning yields another handle to the same
/// controller.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    /// Creates a signed-out controller. Nothing is subscribed until `start()`.
    pub fn new(collaborators: SyncCollaborators, options: SignInOptions) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                sessions: collaborators.sessions,
                records: collaborators.records,
                feed: collaborators.feed,
                options,
                events,
                state: Mutex::new(SyncState::default()),
                lifecycle: Mutex::new(Lifecycle {
                    receiver: Some(receiver),
                    ..Lifecycle::default()
                }),
            }),
        }
    }

    /// Subscribes to session changes, starts the event loop and restores
    /// the current session if the store has one. Calling it again, or after
    /// `dispose()`, does nothing.
    pub async fn start(&self) -> Result<(), SyncError> {
        let receiver = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.started || lifecycle.disposed {
                return Ok(());
            }
            lifecycle.started = true;
            lifecycle.session_subscription = Some(
                self.inner
                    .sessions
                    .on_session_change(self.inner.events.clone()),
            );
            lifecycle.receiver.take()
        };

        if let Some(receiver) = receiver {
            let handle = tokio::spawn(run_event_loop(Arc::downgrade(&self.inner), receiver));
            self.lifecycle().event_loop = Some(handle);
        }
        info!("sync controller started");

        match self.inner.sessions.current_session().await {
            Ok(Some(session)) => {
                self.enter_signed_in(session).await;
                Ok(())
            }
            Ok(None) => {
                debug!("no session to restore");
                Ok(())
            }
            Err(err) => Err(self.surface(err.into())),
        }
    }

    /// Stops the event loop and releases every subscription. Idempotent.
    pub fn dispose(&self) {
        let (event_loop, session_subscription, feed_subscription) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.disposed {
                return;
            }
            lifecycle.disposed = true;
            (
                lifecycle.event_loop.take(),
                lifecycle.session_subscription.take(),
                lifecycle.feed_subscription.take(),
            )
        };

        if let Some(subscription) = session_subscription {
            subscription.cancel();
        }
        if let Some(subscription) = feed_subscription {
            self.inner.feed.unsubscribe(subscription);
        }
        if let Some(handle) = event_loop {
            handle.abort();
        }
        info!("sync controller disposed");
    }

    /// True between `start()` and `dispose()` while the event loop is alive.
    pub fn is_running(&self) -> bool {
        let lifecycle = self.lifecycle();
        !lifecycle.disposed
            && lifecycle
                .event_loop
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
    }

    /// A sender into this controller's event channel.
    pub fn event_sender(&self) -> EventSender {
        self.inner.events.clone()
    }

    /// Applies one collaborator event. The event loop calls this for every
    /// message it receives.
    pub async fn handle_event(&self, event: SyncEvent) {
        match event {
            SyncEvent::SessionChanged(Some(session)) => self.enter_signed_in(session).await,
            SyncEvent::SessionChanged(None) => self.enter_signed_out(),
            SyncEvent::RecordsChanged { owner_id } => {
                let is_current = self
                    .state()
                    .session
                    .as_ref()
                    .map(|s| s.user_id == owner_id)
                    .unwrap_or(false);
                if !is_current {
                    debug!(owner_id, "ignoring change notification for another owner");
                    return;
                }
                debug!(owner_id, "change notification; refreshing");
                // Errors are already in the error slot.
                let _ = self.fetch_bookmarks().await;
            }
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn bookmarks(&self) -> BookmarkList {
        self.state().bookmarks.clone()
    }

    /// True while an add is waiting for the server.
    pub fn is_loading(&self) -> bool {
        self.state().adds_in_flight > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn draft(&self) -> BookmarkDraft {
        self.state().draft.clone()
    }

    pub fn update_draft(&self, title: impl Into<String>, url: impl Into<String>) {
        self.state().draft = BookmarkDraft {
            title: title.into(),
            url: url.into(),
        };
    }

    pub fn clear_error(&self) {
        self.state().last_error = None;
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `err` in the error slot and hands it back.
    fn surface(&self, err: SyncError) -> SyncError {
        warn!(error = %err, "sync operation failed");
        self.state().last_error = Some(err.to_string());
        err
    }

    async fn enter_signed_in(&self, session: Session) {
        let identity_changed = {
            let mut state = self.state();
            let same_identity = state
                .session
                .as_ref()
                .map(|current| current.user_id == session.user_id)
                .unwrap_or(false);
            state.session = Some(session.clone());
            if !same_identity {
                state.bookmarks.clear();
                state.epoch += 1;
            }
            !same_identity
        };

        if !identity_changed {
            debug!(user_id = %session.user_id, "session refreshed");
            return;
        }

        info!(user_id = %session.user_id, "signed in");
        self.replace_feed_subscription(Some(&session.user_id));
        // Errors are already in the error slot.
        let _ = self.fetch_bookmarks().await;
    }

    fn enter_signed_out(&self) {
        let previous = {
            let mut state = self.state();
            state.bookmarks.clear();
            state.epoch += 1;
            state.session.take()
        };
        self.replace_feed_subscription(None);
        if let Some(previous) = previous {
            info!(user_id = %previous.user_id, "signed out");
        }
    }

    /// The disposed check and the swap share one lock, so `dispose()` can
    /// never miss a subscription stored here. A subscription made after
    /// disposal is released straight away.
    fn replace_feed_subscription(&self, owner_id: Option<&str>) {
        let subscription =
            owner_id.map(|owner_id| self.inner.feed.subscribe(owner_id, self.inner.events.clone()));
        let previous = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.disposed {
                subscription
            } else {
                std::mem::replace(&mut lifecycle.feed_subscription, subscription)
            }
        };
        if let Some(previous) = previous {
            debug!(subscription = previous.id(), "releasing change feed subscription");
            self.inner.feed.unsubscribe(previous);
        }
    }
}

#[async_trait]
impl SyncControllerTrait for SyncController {
    /// Asks the session store for a provider sign-in. Enters Signed-in right
    /// away when the store already reports a session; otherwise the
    /// session-changed event does it later.
    async fn sign_in(&self) -> Result<(), SyncError> {
        self.clear_error();
        let options = &self.inner.options;
        info!(provider = %options.provider, "starting sign-in");

        if let Err(err) = self
            .inner
            .sessions
            .sign_in_with_provider(options.provider, &options.return_address)
            .await
        {
            return Err(self.surface(err.into()));
        }

        match self.inner.sessions.current_session().await {
            Ok(Some(session)) => self.enter_signed_in(session).await,
            Ok(None) => debug!("sign-in continues in the browser"),
            Err(err) => return Err(self.surface(err.into())),
        }
        Ok(())
    }

    /// Signs out remotely, then drops the session and list locally no matter
    /// how the remote call went.
    async fn sign_out(&self) -> Result<(), SyncError> {
        self.clear_error();
        let result = self.inner.sessions.sign_out().await;
        self.enter_signed_out();
        result.map_err(|err| self.surface(err.into()))
    }

    async fn add_bookmark(&self, title: &str, raw_url: &str) -> Result<BookmarkRecord, SyncError> {
        let prepared = {
            let mut state = self.state();
            state.last_error = None;
            let parsed = match &state.session {
                Some(session) => NewBookmark::parse(&session.user_id, title, raw_url),
                None => Err(ValidationError::NotSignedIn),
            };
            if parsed.is_ok() {
                state.adds_in_flight += 1;
            }
            let epoch = state.epoch;
            parsed.map(|bookmark| (bookmark, epoch))
        };
        let (bookmark, epoch) = prepared.map_err(|err| self.surface(err.into()))?;

        debug!(user_id = %bookmark.user_id, url = %bookmark.url, "inserting bookmark");
        let result = self.inner.records.insert(bookmark).await;

        let mut state = self.state();
        state.adds_in_flight = state.adds_in_flight.saturating_sub(1);
        match result {
            Ok(record) => {
                if state.epoch == epoch {
                    state.bookmarks.prepend(record.clone());
                    state.draft = BookmarkDraft::default();
                    info!(id = %record.id, "bookmark added");
                } else {
                    debug!(id = %record.id, "session changed during insert; not listing");
                }
                Ok(record)
            }
            Err(err) => {
                drop(state);
                Err(self.surface(err.into()))
            }
        }
    }

    async fn delete_bookmark(&self, id: &str) -> Result<(), SyncError> {
        let prepared = {
            let mut state = self.state();
            state.last_error = None;
            if state.session.is_none() {
                Err(ValidationError::NotSignedIn)
            } else {
                let before = state.bookmarks.clone();
                let removed = state.bookmarks.remove(id);
                Ok((before, removed, state.epoch))
            }
        };
        let (before, removed, epoch) = prepared.map_err(|err| self.surface(err.into()))?;

        debug!(id, removed, "deleting bookmark");
        match self.inner.records.delete_by_id(id).await {
            Ok(()) => {
                info!(id, "bookmark deleted");
                Ok(())
            }
            Err(err) => {
                {
                    let mut state = self.state();
                    if state.epoch == epoch {
                        state.bookmarks = before;
                        warn!(id, "delete rejected; list restored");
                    }
                }
                Err(self.surface(err.into()))
            }
        }
    }

    /// Replaces the list with the server's. Responses that resolve after a
    /// newer fetch was applied, or after the session changed, are dropped.
    async fn fetch_bookmarks(&self) -> Result<(), SyncError> {
        let ticket = {
            let mut state = self.state();
            match state.session.as_ref().map(|s| s.user_id.clone()) {
                Some(owner_id) => {
                    state.fetch_issued += 1;
                    Some((owner_id, state.fetch_issued, state.epoch))
                }
                None => {
                    state.bookmarks.clear();
                    None
                }
            }
        };
        let Some((owner_id, seq, epoch)) = ticket else {
            debug!("fetch skipped; signed out");
            return Ok(());
        };

        debug!(owner_id, seq, "fetching bookmarks");
        let result = self.inner.records.list(&owner_id).await;

        let mut state = self.state();
        let current = state.epoch == epoch;
        match result {
            Ok(records) => {
                if !current || seq < state.fetch_applied {
                    debug!(seq, applied = state.fetch_applied, "discarding stale fetch response");
                } else {
                    state.fetch_applied = seq;
                    state.bookmarks = BookmarkList::from_records(records);
                    debug!(seq, count = state.bookmarks.len(), "bookmarks replaced");
                }
                Ok(())
            }
            Err(err) => {
                drop(state);
                let err = SyncError::from(err);
                if current {
                    Err(self.surface(err))
                } else {
                    debug!(error = %err, "fetch for an ended session failed");
                    Err(err)
                }
            }
        }
    }

    fn snapshot(&self) -> SyncSnapshot {
        let state = self.state();
        SyncSnapshot {
            session: state.session.clone(),
            bookmarks: state.bookmarks.clone(),
            is_loading: state.adds_in_flight > 0,
            last_error: state.last_error.clone(),
            draft: state.draft.clone(),
        }
    }
}

async fn run_event_loop(controller: Weak<Inner>, mut receiver: EventReceiver) {
    while let Some(event) = receiver.recv().await {
        let Some(inner) = controller.upgrade() else {
            break;
        };
        SyncController { inner }.handle_event(event).await;
    }
    debug!("sync event loop stopped");
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SyncController")
            .field("session", &state.session)
            .field("bookmarks", &state.bookmarks.len())
            .field("epoch", &state.epoch)
            .finish_non_exhaustive()
    }
}
