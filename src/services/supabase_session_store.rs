//! Session store over Supabase Auth (GoTrue).
//!
//! Sign-in sends the browser to the provider through the project's
//! `/auth/v1/authorize` page. The provider redirect lands on the app's
//! return address with the session tokens in the URL fragment;
//! [`SupabaseSessionStore::complete_sign_in`] takes that URL, persists the
//! session in SQLite and announces it. A persisted session is restored on
//! startup and refreshed with its refresh token once it nears expiry.
//!
//! A refresh that never reaches the auth server is retried with backoff
//! and, if it still fails, leaves the session in place. A refresh the server
//! refuses ends the session and announces `SessionChanged(None)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use reqwest::Method;
use rusqlite::params;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::database::SharedDatabase;
use crate::platform::UrlOpener;
use crate::services::listeners::ListenerSet;
use crate::services::session_store::{AccessTokenSource, SessionStore};
use crate::services::supabase_client::SupabaseClient;
use crate::types::errors::{AuthError, PersistenceError};
use crate::types::events::{EventSender, Subscription, SyncEvent};
use crate::types::session::{AuthProvider, AuthTokens, BearerToken, Session};

/// Sessions this close to expiry are refreshed instead of used.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Retry behaviour for refreshes that fail in transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Attempts per refresh, the first one included.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RefreshPolicy {
    /// Delay before retrying after attempt `attempt` (0-indexed) failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// A session together with the tokens that back it.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session: Session,
    pub tokens: AuthTokens,
}

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// The access-token claims the client reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

pub struct SupabaseSessionStore {
    client: SupabaseClient,
    db: SharedDatabase,
    opener: Arc<dyn UrlOpener>,
    listeners: ListenerSet,
    refresh_policy: RefreshPolicy,
    /// Serializes refreshes; a refresh token is single-use.
    refresh_lock: AsyncMutex<()>,
}

impl SupabaseSessionStore {
    pub fn new(client: SupabaseClient, db: SharedDatabase, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            client,
            db,
            opener,
            listeners: ListenerSet::new(),
            refresh_policy: RefreshPolicy::default(),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    /// Finishes a provider sign-in from the URL the provider redirected to.
    pub async fn complete_sign_in(&self, callback_url: &str) -> Result<Session, AuthError> {
        let stored = parse_callback(callback_url, Utc::now().timestamp())?;
        self.save(&stored)?;
        info!(user_id = %stored.session.user_id, "provider sign-in completed");
        self.announce(Some(stored.session.clone()));
        Ok(stored.session.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The persisted session, refreshed first when it is within
    /// `EXPIRY_MARGIN_SECS` of expiry.
    ///
    /// A refusal from the auth server removes the session, announces the
    /// end of it and yields `Ok(None)`. A refresh that cannot reach the
    /// server keeps the session and returns the error.
    async fn valid_session(&self) -> Result<Option<StoredSession>, AuthError> {
        match self.load()? {
            Some(stored) if is_fresh(&stored) => return Ok(Some(stored)),
            None => return Ok(None),
            Some(_) => {}
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while this one waited.
        let stored = match self.load()? {
            Some(stored) if is_fresh(&stored) => return Ok(Some(stored)),
            None => return Ok(None),
            Some(stored) => stored,
        };

        info!(user_id = %stored.session.user_id, "access token expiring; refreshing");
        match self.refresh_with_backoff(&stored.tokens).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(err) if err.is_transient() => {
                warn!(error = %err, "auth server unreachable; keeping session");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "session refresh refused; signing out locally");
                self.remove()?;
                self.announce(None);
                Ok(None)
            }
        }
    }

    async fn refresh_with_backoff(&self, tokens: &AuthTokens) -> Result<StoredSession, AuthError> {
        let policy = &self.refresh_policy;
        let mut attempt = 0;
        loop {
            match self.refresh_with(tokens).await {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient() && attempt + 1 < policy.max_retries => {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "refresh failed in transit; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn refresh_with(&self, tokens: &AuthTokens) -> Result<StoredSession, AuthError> {
        let url = self.client.auth_url("token?grant_type=refresh_token");
        debug!("refreshing Supabase session");

        let response = self
            .client
            .request(Method::POST, &url, None)
            .json(&serde_json::json!({ "refresh_token": tokens.refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let response = self
            .client
            .check_response(response)
            .await
            .map_err(auth_error)?;
        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Store(format!("Invalid token response: {}", e)))?;

        let stored = StoredSession {
            session: Session::new(data.user.id.clone(), non_empty(data.user.email.clone())),
            tokens: AuthTokens {
                access_token: data.access_token.clone(),
                refresh_token: data.refresh_token.clone(),
                expires_at: Utc::now().timestamp() + data.expires_in,
            },
        };
        self.save(&stored)?;
        info!(user_id = %stored.session.user_id, "Supabase session refreshed");
        self.announce(Some(stored.session.clone()));
        Ok(stored)
    }

    async fn revoke(&self, tokens: &AuthTokens) -> Result<(), AuthError> {
        let url = self.client.auth_url("logout");
        let response = self
            .client
            .request(Method::POST, &url, Some(&tokens.access_token))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        self.client
            .check_response(response)
            .await
            .map_err(auth_error)?;
        Ok(())
    }

    /// Reads the persisted session, if any.
    pub fn load(&self) -> Result<Option<StoredSession>, AuthError> {
        let db = self.db.lock();
        let result = db.connection().query_row(
            "SELECT user_id, email, access_token, refresh_token, expires_at \
             FROM auth_sessions WHERE id = 'default'",
            [],
            |row| {
                Ok(StoredSession {
                    session: Session::new(row.get::<_, String>(0)?, row.get(1)?),
                    tokens: AuthTokens {
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        expires_at: row.get(4)?,
                    },
                })
            },
        );

        match result {
            Ok(stored) => Ok(Some(stored)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }

    fn save(&self, stored: &StoredSession) -> Result<(), AuthError> {
        self.db
            .lock()
            .connection()
            .execute(
                "INSERT OR REPLACE INTO auth_sessions \
                 (id, user_id, email, access_token, refresh_token, expires_at, updated_at) \
                 VALUES ('default', ?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.session.user_id,
                    stored.session.email,
                    stored.tokens.access_token,
                    stored.tokens.refresh_token,
                    stored.tokens.expires_at,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        self.db
            .lock()
            .connection()
            .execute("DELETE FROM auth_sessions", [])
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(())
    }

    fn announce(&self, session: Option<Session>) {
        let delivered = self
            .listeners
            .notify_all(&SyncEvent::SessionChanged(session));
        debug!(delivered, "session change announced");
    }
}

#[async_trait]
impl SessionStore for SupabaseSessionStore {
    /// Returns the persisted session, refreshing it when it is about to
    /// expire. A session the auth server refuses to refresh is removed,
    /// announced as ended, and reported as absent; an unreachable server is
    /// an error and the session stays stored.
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.valid_session().await?.map(|stored| stored.session))
    }

    async fn sign_in_with_provider(
        &self,
        provider: AuthProvider,
        return_address: &str,
    ) -> Result<(), AuthError> {
        let url = self
            .client
            .authorize_url(provider, return_address)
            .map_err(|e| AuthError::ProviderRejected(e.to_string()))?;
        info!(%provider, return_address, "opening provider sign-in page");
        self.opener
            .open(url.as_str())
            .map_err(AuthError::BrowserLaunch)
    }

    /// Revokes the session on the server, then always drops it locally.
    async fn sign_out(&self) -> Result<(), AuthError> {
        let remote = match self.load()? {
            Some(stored) => self.revoke(&stored.tokens).await,
            None => Ok(()),
        };
        if let Err(err) = &remote {
            warn!(error = %err, "server-side sign-out failed");
        }

        let removed = self.remove();
        self.announce(None);
        remote.and(removed)
    }

    fn on_session_change(&self, sender: EventSender) -> Subscription {
        self.listeners.register("auth", None, sender)
    }
}

#[async_trait]
impl AccessTokenSource for SupabaseSessionStore {
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        Ok(self.valid_session().await?.map(|stored| BearerToken {
            user_id: stored.session.user_id.clone(),
            token: stored.tokens.access_token.clone(),
        }))
    }
}

fn is_fresh(stored: &StoredSession) -> bool {
    !stored
        .tokens
        .is_expired_at(Utc::now().timestamp() + EXPIRY_MARGIN_SECS)
}

/// 5xx answers count as transient, like transport errors.
fn auth_error(err: PersistenceError) -> AuthError {
    match err {
        PersistenceError::Rejected { status, message } if status >= 500 => {
            AuthError::Network(format!("{} (HTTP {})", message, status))
        }
        PersistenceError::Rejected { message, .. } => AuthError::Store(message),
        PersistenceError::Network(message) => AuthError::Network(message),
        other => AuthError::Store(other.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Reads the claims out of a JWT access token without verifying it.
/// The server verifies the signature on every request.
pub fn decode_access_claims(token: &str) -> Result<AccessClaims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidCallback("access token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidCallback(format!("access token payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidCallback(format!("access token claims: {}", e)))
}

/// Turns the provider redirect URL into a session.
///
/// Errors reported by the provider (`error`, `error_description` in the
/// query or fragment) become `AuthError::ProviderRejected`.
pub fn parse_callback(callback_url: &str, now: i64) -> Result<StoredSession, AuthError> {
    let url = Url::parse(callback_url).map_err(|e| AuthError::InvalidCallback(e.to_string()))?;

    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    let param = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    if let Some(error) = param("error") {
        return Err(AuthError::ProviderRejected(
            param("error_description").unwrap_or(error),
        ));
    }

    let access_token = param("access_token")
        .ok_or_else(|| AuthError::InvalidCallback("missing access_token".to_string()))?;
    let refresh_token = param("refresh_token")
        .ok_or_else(|| AuthError::InvalidCallback("missing refresh_token".to_string()))?;
    let claims = decode_access_claims(&access_token)?;

    let expires_at = param("expires_at")
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| {
            param("expires_in")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| now + secs)
        })
        .or(claims.exp)
        .ok_or_else(|| AuthError::InvalidCallback("missing session expiry".to_string()))?;

    Ok(StoredSession {
        session: Session::new(claims.sub, non_empty(claims.email)),
        tokens: AuthTokens {
            access_token,
            refresh_token,
            expires_at,
        },
    })
}
