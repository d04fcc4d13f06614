//! Record Service contract.
//!
//! Durable storage for bookmark rows. Per-user isolation is the service's
//! job; the client trusts whatever rows `list` returns.

use async_trait::async_trait;

use crate::types::bookmark::{BookmarkRecord, NewBookmark};
use crate::types::errors::PersistenceError;

#[async_trait]
pub trait RecordService: Send + Sync {
    /// All rows owned by `owner_id`, newest `created_at` first.
    async fn list(&self, owner_id: &str) -> Result<Vec<BookmarkRecord>, PersistenceError>;

    /// Inserts a row and returns it as stored, with server-assigned id and timestamp.
    async fn insert(&self, bookmark: NewBookmark) -> Result<BookmarkRecord, PersistenceError>;

    /// Deletes the row with `id`.
    async fn delete_by_id(&self, id: &str) -> Result<(), PersistenceError>;
}
