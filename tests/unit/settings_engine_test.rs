//! Integration-level unit tests for the SettingsEngine public API.
//!
//! These tests exercise the SettingsEngine through its public trait interface,
//! validating default loading, value persistence, reset behavior, and
//! environment overrides.

use smartmarks::services::settings_engine::{
    SettingsEngine, SettingsEngineTrait, ENV_BACKEND, ENV_SUPABASE_ANON_KEY, ENV_SUPABASE_URL,
};
use smartmarks::types::session::AuthProvider;
use smartmarks::types::settings::{AuthSettings, BackendKind, ClientSettings};
use tempfile::TempDir;

/// Helper: create a SettingsEngine backed by a temp directory that lives for the
/// duration of the test (the caller holds the `TempDir` handle).
fn engine_in_temp(dir: &TempDir) -> SettingsEngine {
    let path = dir
        .path()
        .join("settings.json")
        .to_string_lossy()
        .to_string();
    SettingsEngine::new(Some(path))
}

/// Without a config file the client starts on the local backend.
#[test]
fn test_load_defaults_when_no_config_file_exists() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);

    let settings = engine.load().unwrap();

    assert_eq!(settings, ClientSettings::default());
    assert_eq!(settings.backend.kind, BackendKind::Local);
    assert_eq!(settings.backend.table, "bookmarks");
    assert_eq!(settings.auth.provider, AuthProvider::Google);
    assert_eq!(settings.auth.return_address, "http://localhost:3000/auth/callback");
    assert_eq!(settings.logging.filter, "smartmarks=info");
}

/// `set_value` writes through, so a fresh engine on the same file sees it.
#[test]
fn test_set_value_persists_changes() {
    let dir = TempDir::new().unwrap();

    {
        let mut engine = engine_in_temp(&dir);
        engine.load().unwrap();
        engine
            .set_value(
                "backend.supabase_url",
                serde_json::Value::String("https://proj.supabase.co".to_string()),
            )
            .unwrap();
    }

    let mut engine2 = engine_in_temp(&dir);
    let loaded = engine2.load().unwrap();
    assert_eq!(loaded.backend.supabase_url, "https://proj.supabase.co");
}

#[test]
fn test_reset_restores_defaults() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    engine
        .set_value("logging.filter", serde_json::json!("smartmarks=debug"))
        .unwrap();

    engine.reset().unwrap();
    assert_eq!(*engine.get_settings(), ClientSettings::default());

    let mut engine2 = engine_in_temp(&dir);
    assert_eq!(engine2.load().unwrap(), ClientSettings::default());
}

/// Files written by older versions may lack whole sections.
#[test]
fn test_partial_file_fills_in_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("settings.json"),
        r#"{"backend":{"kind":"supabase","supabase_url":"https://p.supabase.co"}}"#,
    )
    .unwrap();

    let mut engine = engine_in_temp(&dir);
    let settings = engine.load().unwrap();
    assert_eq!(settings.backend.kind, BackendKind::Supabase);
    assert_eq!(settings.backend.request_timeout_secs, 30);
    assert_eq!(settings.auth, AuthSettings::default());
}

#[test]
fn test_set_value_unknown_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();

    assert!(engine.set_value("backend.nope", serde_json::json!(1)).is_err());
    assert!(engine.set_value("", serde_json::json!(1)).is_err());
    assert!(engine.set_value("auth.provider", serde_json::json!("myspace")).is_err());
}

#[test]
fn test_malformed_file_is_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.json"), "{ invalid json }").unwrap();

    let mut engine = engine_in_temp(&dir);
    assert!(engine.load().is_err());
}

#[test]
fn test_env_overrides_select_supabase() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();

    engine
        .apply_overrides(|name| match name {
            n if n == ENV_BACKEND => Some("supabase".to_string()),
            n if n == ENV_SUPABASE_URL => Some("https://proj.supabase.co".to_string()),
            n if n == ENV_SUPABASE_ANON_KEY => Some("anon".to_string()),
            _ => None,
        })
        .unwrap();

    let backend = &engine.get_settings().backend;
    assert_eq!(backend.kind, BackendKind::Supabase);
    assert_eq!(backend.supabase_url, "https://proj.supabase.co");
    assert_eq!(backend.anon_key, "anon");
}
