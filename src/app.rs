//! App Core for smartmarks.
//!
//! Central struct wiring the configured backend (Supabase or local) into a
//! `SyncController`, and managing its lifecycle.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::info;

use crate::database::{Database, SharedDatabase};
use crate::managers::sync_controller::{SignInOptions, SyncCollaborators, SyncController};
use crate::platform::{SystemBrowser, UrlOpener};
use crate::services::change_feed::{ChangeFeed, LocalChangeFeed, PollingChangeFeed};
use crate::services::local_backend::{LocalRecordService, LocalSessionStore};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::supabase_client::SupabaseClient;
use crate::services::supabase_record_service::SupabaseRecordService;
use crate::services::supabase_session_store::SupabaseSessionStore;
use crate::types::errors::{AuthError, SyncError};
use crate::types::session::Session;
use crate::types::settings::{BackendKind, ClientSettings};

/// File name of the SQLite database inside the data directory.
pub const DATABASE_FILE: &str = "smartmarks.db";

/// The concrete collaborators behind the controller.
pub enum Backend {
    Supabase {
        sessions: Arc<SupabaseSessionStore>,
        records: Arc<SupabaseRecordService>,
    },
    Local {
        sessions: Arc<LocalSessionStore>,
        records: Arc<LocalRecordService>,
    },
    /// Collaborators handed in by the embedder.
    Injected,
}

/// Central application struct holding the controller and its backend.
pub struct App {
    /// The settings the app was built with. Changes made through
    /// `settings_engine` take effect on the next launch.
    pub settings: ClientSettings,
    settings_engine: Mutex<SettingsEngine>,
    pub db: SharedDatabase,
    pub feed: LocalChangeFeed,
    pub backend: Backend,
    pub controller: SyncController,
}

impl App {
    /// Creates a new App with its database in `data_dir`, opening sign-in
    /// pages in the system browser.
    pub fn new(
        settings_engine: SettingsEngine,
        data_dir: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::open(data_dir.join(DATABASE_FILE))?.into_shared();
        Self::with_database(settings_engine, db, Arc::new(SystemBrowser))
    }

    /// Creates an App over an already-open database, using the settings
    /// currently in effect in `settings_engine`.
    pub fn with_database(
        settings_engine: SettingsEngine,
        db: SharedDatabase,
        opener: Arc<dyn UrlOpener>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let settings = settings_engine.get_settings().clone();
        let feed = LocalChangeFeed::new();

        let (backend, collaborators) = match settings.backend.kind {
            BackendKind::Supabase => {
                if settings.backend.supabase_url.is_empty() || settings.backend.anon_key.is_empty() {
                    return Err("Supabase backend needs backend.supabase_url and backend.anon_key".into());
                }
                let client = SupabaseClient::from_settings(&settings.backend)?;
                let sessions = Arc::new(SupabaseSessionStore::new(client.clone(), db.clone(), opener));
                let records = Arc::new(SupabaseRecordService::new(
                    client,
                    settings.backend.table.clone(),
                    sessions.clone(),
                    feed.clone(),
                ));
                let remote_feed: Arc<dyn ChangeFeed> = Arc::new(PollingChangeFeed::new(
                    records.clone(),
                    feed.clone(),
                    Duration::from_secs(settings.backend.poll_interval_secs),
                ));
                let collaborators = SyncCollaborators {
                    sessions: sessions.clone(),
                    records: records.clone(),
                    feed: remote_feed,
                };
                (Backend::Supabase { sessions, records }, collaborators)
            }
            BackendKind::Local => {
                let identity = Session::new(
                    settings.auth.local_user_id.clone(),
                    settings.auth.local_email.clone(),
                );
                let sessions = Arc::new(LocalSessionStore::new(identity));
                let records = Arc::new(LocalRecordService::new(db.clone(), feed.clone()));
                let collaborators = SyncCollaborators {
                    sessions: sessions.clone(),
                    records: records.clone(),
                    feed: Arc::new(feed.clone()),
                };
                (Backend::Local { sessions, records }, collaborators)
            }
        };

        let controller = SyncController::new(collaborators, SignInOptions::from(&settings.auth));
        info!(backend = ?settings.backend.kind, "app initialized");

        Ok(Self {
            settings,
            settings_engine: Mutex::new(settings_engine),
            db,
            feed,
            backend,
            controller,
        })
    }

    /// Creates an App around collaborators built elsewhere. The session
    /// store is expected to finish sign-in on its own.
    pub fn with_collaborators(
        settings_engine: SettingsEngine,
        db: SharedDatabase,
        feed: LocalChangeFeed,
        collaborators: SyncCollaborators,
    ) -> Self {
        let settings = settings_engine.get_settings().clone();
        let controller = SyncController::new(collaborators, SignInOptions::from(&settings.auth));
        Self {
            settings,
            settings_engine: Mutex::new(settings_engine),
            db,
            feed,
            backend: Backend::Injected,
            controller,
        }
    }

    pub fn settings_engine(&self) -> MutexGuard<'_, SettingsEngine> {
        self.settings_engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Startup sequence: restore the session and start listening for changes.
    pub async fn startup(&self) -> Result<(), SyncError> {
        self.controller.start().await
    }

    /// Shutdown sequence: stop the controller and release its subscriptions.
    pub fn shutdown(&self) {
        self.controller.dispose();
    }

    /// Finishes a browser sign-in from the provider redirect URL.
    ///
    /// The resulting session reaches the controller as a session-changed
    /// event, the same way any other sign-in does.
    pub async fn complete_sign_in(&self, callback_url: &str) -> Result<Session, AuthError> {
        match &self.backend {
            Backend::Supabase { sessions, .. } => sessions.complete_sign_in(callback_url).await,
            Backend::Local { .. } | Backend::Injected => Err(AuthError::InvalidCallback(
                "this backend signs in without a provider redirect".to_string(),
            )),
        }
    }
}
