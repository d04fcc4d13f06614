use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::ValidationError;

/// A bookmark row as stored by the record service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookmarkRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a bookmark. `id` and `created_at` are assigned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub user_id: String,
    pub title: String,
    pub url: String,
}

impl NewBookmark {
    /// Validates raw form input and normalizes it for `user_id`.
    ///
    /// The title is trimmed and must not be empty. The URL is trimmed, must
    /// parse as an absolute URL, and is stored in its canonical serialization
    /// (`https://x.dev` becomes `https://x.dev/`).
    pub fn parse(user_id: &str, title: &str, raw_url: &str) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }

        let raw_url = raw_url.trim();
        let url = Url::parse(raw_url)
            .map_err(|e| ValidationError::InvalidUrl(format!("'{}' ({})", raw_url, e)))?;

        Ok(Self {
            user_id: user_id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        })
    }
}

/// Newest-first list of the signed-in user's bookmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkList {
    records: Vec<BookmarkRecord>,
}

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps records already ordered by `created_at` descending.
    pub fn from_records(records: Vec<BookmarkRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[BookmarkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BookmarkRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &str) -> Option<&BookmarkRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Puts a freshly created record at the front.
    ///
    /// A row with the same id that a concurrent refresh already delivered is
    /// dropped first so the record never shows twice.
    pub fn prepend(&mut self, record: BookmarkRecord) {
        self.records.retain(|r| r.id != record.id);
        self.records.insert(0, record);
    }

    /// Filters out every record with `id`. Returns true if anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn into_records(self) -> Vec<BookmarkRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a BookmarkList {
    type Item = &'a BookmarkRecord;
    type IntoIter = std::slice::Iter<'a, BookmarkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Pending form input for a new bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkDraft {
    pub title: String,
    pub url: String,
}
