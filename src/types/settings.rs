use serde::{Deserialize, Serialize};

use super::session::AuthProvider;

/// Top-level client settings container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

/// Which collaborators back the sync controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted Supabase project (auth + REST).
    Supabase,
    /// On-disk SQLite store with an in-process identity. Works offline.
    #[default]
    Local,
}

/// Connection settings for the record and session services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub supabase_url: String,
    pub anon_key: String,
    pub table: String,
    pub request_timeout_secs: u64,
    /// How often the Supabase backend polls for changes made by other
    /// clients. `0` disables polling.
    pub poll_interval_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            supabase_url: String::new(),
            anon_key: String::new(),
            table: "bookmarks".to_string(),
            request_timeout_secs: 30,
            poll_interval_secs: 15,
        }
    }
}

/// Sign-in settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub provider: AuthProvider,
    /// Where the provider sends the browser after consent.
    pub return_address: String,
    /// Identity used by the local backend.
    pub local_user_id: String,
    pub local_email: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            provider: AuthProvider::Google,
            return_address: "http://localhost:3000/auth/callback".to_string(),
            local_user_id: "local-user".to_string(),
            local_email: None,
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "smartmarks=info".to_string(),
        }
    }
}
