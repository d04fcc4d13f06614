//! Local backend for smartmarks.
//!
//! Implements `SessionStore` with an in-process identity and `RecordService`
//! on the SQLite `bookmarks` table. Used for offline/demo mode and as the
//! reference backend in tests. Ids are UUIDs and `created_at` is assigned
//! here, strictly increasing, the way the hosted service assigns them.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::SharedDatabase;
use crate::services::change_feed::LocalChangeFeed;
use crate::services::listeners::ListenerSet;
use crate::services::record_service::RecordService;
use crate::services::session_store::SessionStore;
use crate::types::bookmark::{BookmarkRecord, NewBookmark};
use crate::types::errors::{AuthError, PersistenceError};
use crate::types::events::{EventSender, Subscription, SyncEvent};
use crate::types::session::{AuthProvider, Session};

// === LocalSessionStore ===

/// Session store that signs in a fixed identity without any provider round-trip.
pub struct LocalSessionStore {
    identity: Session,
    current: Mutex<Option<Session>>,
    listeners: ListenerSet,
}

impl LocalSessionStore {
    /// A store that starts signed out and signs in as `identity`.
    pub fn new(identity: Session) -> Self {
        Self {
            identity,
            current: Mutex::new(None),
            listeners: ListenerSet::new(),
        }
    }

    /// A store whose session is already established, as after a restart.
    pub fn signed_in(identity: Session) -> Self {
        let store = Self::new(identity.clone());
        *store.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity);
        store
    }

    pub fn identity(&self) -> &Session {
        &self.identity
    }

    /// Ends the session as if it expired on the server.
    pub fn expire(&self) {
        info!(user_id = %self.identity.user_id, "local session expired");
        self.set_current(None);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn set_current(&self, session: Option<Session>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        self.listeners.notify_all(&SyncEvent::SessionChanged(session));
    }
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn sign_in_with_provider(
        &self,
        provider: AuthProvider,
        return_address: &str,
    ) -> Result<(), AuthError> {
        info!(%provider, return_address, user_id = %self.identity.user_id, "local sign-in");
        self.set_current(Some(self.identity.clone()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        info!(user_id = %self.identity.user_id, "local sign-out");
        self.set_current(None);
        Ok(())
    }

    fn on_session_change(&self, sender: EventSender) -> Subscription {
        self.listeners.register("auth", None, sender)
    }
}

// === LocalRecordService ===

/// Record service backed by a SQLite connection.
pub struct LocalRecordService {
    db: SharedDatabase,
    feed: LocalChangeFeed,
}

impl LocalRecordService {
    pub fn new(db: SharedDatabase, feed: LocalChangeFeed) -> Self {
        Self { db, feed }
    }

    /// Computes the next `created_at` value: now, or one microsecond past the
    /// newest row if the clock has not moved on.
    fn next_created_at(conn: &rusqlite::Connection) -> Result<i64, PersistenceError> {
        let newest: i64 = conn.query_row(
            "SELECT COALESCE(MAX(created_at), 0) FROM bookmarks",
            [],
            |row| row.get(0),
        )?;
        Ok(Utc::now().timestamp_micros().max(newest + 1))
    }

    /// Reads a single `BookmarkRecord` row into a struct.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<BookmarkRecord> {
        let micros: i64 = row.get(4)?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(4, micros)
        })?;
        Ok(BookmarkRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            created_at,
        })
    }
}

#[async_trait]
impl RecordService for LocalRecordService {
    async fn list(&self, owner_id: &str) -> Result<Vec<BookmarkRecord>, PersistenceError> {
        let db = self.db.lock();
        let mut stmt = db.connection().prepare(
            "SELECT id, user_id, title, url, created_at FROM bookmarks \
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], Self::row_to_record)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!(owner_id, count = results.len(), "listed local bookmarks");
        Ok(results)
    }

    async fn insert(&self, bookmark: NewBookmark) -> Result<BookmarkRecord, PersistenceError> {
        let record = {
            let db = self.db.lock();
            let conn = db.connection();
            let micros = Self::next_created_at(conn)?;
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, title, url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, bookmark.user_id, bookmark.title, bookmark.url, micros],
            )?;
            conn.query_row(
                "SELECT id, user_id, title, url, created_at FROM bookmarks WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )?
        };

        debug!(id = %record.id, owner_id = %record.user_id, "inserted local bookmark");
        self.feed.publish(&record.user_id);
        Ok(record)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), PersistenceError> {
        let owner: Option<String> = {
            let db = self.db.lock();
            let conn = db.connection();
            let owner = match conn.query_row(
                "SELECT user_id FROM bookmarks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            ) {
                Ok(owner) => Some(owner),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
            owner
        };

        // Deleting a missing row is not an error, matching the hosted service.
        match owner {
            Some(owner) => {
                debug!(id, owner_id = %owner, "deleted local bookmark");
                self.feed.publish(&owner);
            }
            None => debug!(id, "delete matched no local bookmark"),
        }
        Ok(())
    }
}
