// smartmarks Settings Engine
// Manages client settings: loading, saving, updating individual values, and resetting to defaults.
// Settings are stored as a JSON file at the platform-specific config path. Environment
// overrides are applied in memory only and never written back.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::{BackendKind, ClientSettings};

/// Environment variable naming the Supabase project URL.
pub const ENV_SUPABASE_URL: &str = "SMARTMARKS_SUPABASE_URL";
/// Environment variable holding the Supabase anon (public) key.
pub const ENV_SUPABASE_ANON_KEY: &str = "SMARTMARKS_SUPABASE_ANON_KEY";
/// Environment variable selecting the backend: `supabase` or `local`.
pub const ENV_BACKEND: &str = "SMARTMARKS_BACKEND";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ClientSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &ClientSettings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Values taken from the environment on top of the file.
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    backend: Option<BackendKind>,
    supabase_url: Option<String>,
    anon_key: Option<String>,
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    /// What the file holds; the only thing `save` writes.
    settings: ClientSettings,
    overrides: EnvOverrides,
    /// `settings` with `overrides` applied.
    effective: ClientSettings,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine.
    ///
    /// If `path_override` is `Some`, uses that path for the config file.
    /// Otherwise, uses the platform-specific config directory with `settings.json`.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: ClientSettings::default(),
            overrides: EnvOverrides::default(),
            effective: ClientSettings::default(),
        }
    }

    /// Applies overrides looked up by environment variable name.
    ///
    /// Empty values are ignored. An unknown backend name is an
    /// `InvalidValue` error and leaves the settings untouched.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = match get(ENV_BACKEND) {
            Some(raw) => Some(match raw.trim().to_ascii_lowercase().as_str() {
                "supabase" => BackendKind::Supabase,
                "local" => BackendKind::Local,
                other => {
                    return Err(SettingsError::InvalidValue(format!(
                        "{} must be 'supabase' or 'local', got '{}'",
                        ENV_BACKEND, other
                    )))
                }
            }),
            None => None,
        };

        let overrides = EnvOverrides {
            backend,
            supabase_url: get(ENV_SUPABASE_URL),
            anon_key: get(ENV_SUPABASE_ANON_KEY),
        };
        debug!(
            backend = ?overrides.backend,
            supabase_url = ?overrides.supabase_url,
            anon_key = overrides.anon_key.is_some(),
            "environment overrides applied"
        );
        self.overrides = overrides;
        self.refresh_effective();
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn refresh_effective(&mut self) {
        let mut effective = self.settings.clone();
        if let Some(kind) = self.overrides.backend {
            effective.backend.kind = kind;
        }
        if let Some(url) = &self.overrides.supabase_url {
            effective.backend.supabase_url = url.clone();
        }
        if let Some(key) = &self.overrides.anon_key {
            effective.backend.anon_key = key.clone();
        }
        self.effective = effective;
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// If the file does not exist, returns default settings.
    /// If the file exists but is malformed, returns a serialization error.
    fn load(&mut self) -> Result<ClientSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.settings = ClientSettings::default();
            self.refresh_effective();
            return Ok(self.effective.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: ClientSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        self.settings = settings;
        self.refresh_effective();
        Ok(self.effective.clone())
    }

    /// Saves the current settings to the JSON config file.
    ///
    /// Creates parent directories if they don't exist.
    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// The settings in effect, environment overrides included.
    fn get_settings(&self) -> &ClientSettings {
        &self.effective
    }

    /// Updates an individual setting by dot-notation key path, then saves.
    ///
    /// # Examples
    /// - `"backend.kind"` → updates `settings.backend.kind`
    /// - `"auth.provider"` → updates `settings.auth.provider`
    /// - `"logging.filter"` → updates `settings.logging.filter`
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }
        let parts: Vec<&str> = key.split('.').collect();

        let mut json_value = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        {
            let mut current = &mut json_value;
            for (i, part) in parts.iter().enumerate() {
                if i == parts.len() - 1 {
                    match current {
                        serde_json::Value::Object(map) => {
                            if !map.contains_key(*part) {
                                return Err(SettingsError::InvalidKey(format!(
                                    "Key '{}' not found in settings",
                                    key
                                )));
                            }
                            map.insert(part.to_string(), value.clone());
                        }
                        _ => {
                            return Err(SettingsError::InvalidKey(format!(
                                "Cannot navigate to key '{}': intermediate value is not an object",
                                key
                            )));
                        }
                    }
                } else {
                    current = match current.get_mut(*part) {
                        Some(v) => v,
                        None => {
                            return Err(SettingsError::InvalidKey(format!(
                                "Key '{}' not found in settings",
                                key
                            )));
                        }
                    };
                }
            }
        }

        // Round-trip through ClientSettings to validate the new value
        let new_settings: ClientSettings = serde_json::from_value(json_value).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.settings = new_settings;
        self.refresh_effective();
        self.save()?;

        Ok(())
    }

    /// Resets all settings to factory defaults and saves to disk.
    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = ClientSettings::default();
        self.refresh_effective();
        self.save()?;
        Ok(())
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
