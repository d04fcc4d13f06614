//! Record service over the Supabase REST API (PostgREST).
//!
//! Row-level security on the table restricts every request to the caller's
//! own rows; the `user_id` filter on `list` only narrows the query.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::services::change_feed::LocalChangeFeed;
use crate::services::record_service::RecordService;
use crate::services::session_store::AccessTokenSource;
use crate::services::supabase_client::SupabaseClient;
use crate::types::bookmark::{BookmarkRecord, NewBookmark};
use crate::types::errors::PersistenceError;
use crate::types::session::BearerToken;

pub struct SupabaseRecordService {
    client: SupabaseClient,
    table: String,
    tokens: Arc<dyn AccessTokenSource>,
    feed: LocalChangeFeed,
}

impl SupabaseRecordService {
    pub fn new(
        client: SupabaseClient,
        table: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        feed: LocalChangeFeed,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            tokens,
            feed,
        }
    }

    /// Query parameters selecting `owner_id`'s rows, newest first.
    pub fn list_query(owner_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner_id)),
            ("order", "created_at.desc".to_string()),
        ]
    }

    pub fn delete_query(id: &str) -> Vec<(&'static str, String)> {
        vec![("id", format!("eq.{}", id))]
    }

    async fn access_token(&self) -> Result<BearerToken, PersistenceError> {
        self.tokens
            .bearer_token()
            .await?
            .ok_or(PersistenceError::Unauthenticated)
    }
}

#[async_trait]
impl RecordService for SupabaseRecordService {
    async fn list(&self, owner_id: &str) -> Result<Vec<BookmarkRecord>, PersistenceError> {
        let token = self.access_token().await?;
        let url = self.client.rest_url(&self.table);

        debug!(owner_id, "fetching bookmarks from Supabase");

        let response = self
            .client
            .request(Method::GET, &url, Some(&token.token))
            .query(&Self::list_query(owner_id))
            .send()
            .await?;
        let response = self.client.check_response(response).await?;
        let records: Vec<BookmarkRecord> = response.json().await?;

        debug!(owner_id, count = records.len(), "bookmarks fetched from Supabase");
        Ok(records)
    }

    async fn insert(&self, bookmark: NewBookmark) -> Result<BookmarkRecord, PersistenceError> {
        let token = self.access_token().await?;
        let url = self.client.rest_url(&self.table);

        debug!(owner_id = %bookmark.user_id, url = %bookmark.url, "inserting bookmark into Supabase");

        // The object media type makes PostgREST answer with the single row.
        let response = self
            .client
            .request(Method::POST, &url, Some(&token.token))
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(&bookmark)
            .send()
            .await?;
        let response = self.client.check_response(response).await?;
        let record: BookmarkRecord = response.json().await?;

        debug!(id = %record.id, "bookmark inserted into Supabase");
        self.feed.publish(&record.user_id);
        Ok(record)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), PersistenceError> {
        let token = self.access_token().await?;
        let url = self.client.rest_url(&self.table);

        debug!(id, "deleting bookmark from Supabase");

        let response = self
            .client
            .request(Method::DELETE, &url, Some(&token.token))
            .query(&Self::delete_query(id))
            .send()
            .await?;
        self.client.check_response(response).await?;

        debug!(id, "bookmark deleted from Supabase");
        self.feed.publish(&token.user_id);
        Ok(())
    }
}
