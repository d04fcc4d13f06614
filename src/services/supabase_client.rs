//! Supabase HTTP plumbing shared by the session store and the record service.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::error;
use url::Url;

use crate::types::errors::PersistenceError;
use crate::types::session::AuthProvider;
use crate::types::settings::BackendSettings;

/// Supabase project client: base URL, publishable key and a pooled HTTP client.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Arguments
    /// * `api_url` - The project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The project's anonymous (publishable) API key
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), api_url, anon_key)
    }

    /// Builds a client from settings, applying the configured request timeout.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self::with_http_client(
            http_client,
            settings.supabase_url.clone(),
            settings.anon_key.clone(),
        ))
    }

    fn with_http_client(
        http_client: reqwest::Client,
        api_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            api_url,
            anon_key: anon_key.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Build the REST API URL for a table.
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    /// Build an auth API URL (`path` without leading slash, e.g. `"logout"`).
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    /// The page that starts a provider sign-in and redirects back to `redirect_to`.
    pub fn authorize_url(&self, provider: AuthProvider, redirect_to: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.auth_url("authorize"),
            &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
        )
    }

    /// A request carrying the project key, authorized as `access_token` or,
    /// without one, as the anonymous role.
    pub fn request(&self, method: Method, url: &str, access_token: Option<&str>) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Passes successful responses through; turns the rest into `PersistenceError::Rejected`.
    pub async fn check_response(&self, response: Response) -> Result<Response, PersistenceError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("Supabase request failed: {} - {}", status, body);
        Err(PersistenceError::Rejected {
            status,
            message: error_message(status, &body),
        })
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Error bodies from PostgREST (`message`) and GoTrue (`msg`,
/// `error_description`, `error`).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Extracts the human-readable message from an error response body.
///
/// Falls back to the raw body, then to the status code.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed
            .message
            .or(parsed.msg)
            .or(parsed.error_description)
            .or(parsed.error)
            .filter(|m| !m.trim().is_empty())
        {
            return message;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("Request failed with status {}", status)
    } else {
        body.to_string()
    }
}
