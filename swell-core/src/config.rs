use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::provider::{Credential, ProviderId};

/// Per-provider settings: credentials plus optional endpoint/timeout overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8000".to_string() }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Refuse to start when a paid provider has no credentials.
    #[serde(default)]
    pub strict_credentials: bool,

    /// PostgreSQL URL used only for the health connectivity check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Example TOML:
    /// [providers.stormglass]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    fn provider_entry(&mut self, id: ProviderId) -> &mut ProviderConfig {
        self.providers.entry(id.as_str().to_string()).or_default()
    }

    /// Load config from the platform config directory, or an empty default on first run.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "swellsense", "swell")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Overlay credentials and the database URL from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overlay values from `lookup`, which maps variable names to values.
    ///
    /// Recognised names are `SWELL_<PROVIDER>_API_KEY`, `SWELL_<PROVIDER>_USERNAME`,
    /// `SWELL_<PROVIDER>_PASSWORD`, `SWELL_DATABASE_URL` and `DATABASE_URL`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for &id in ProviderId::all() {
            let prefix = format!("SWELL_{}", id.as_str().to_uppercase());

            if let Some(key) = non_empty(&format!("{prefix}_API_KEY")) {
                self.provider_entry(id).api_key = Some(key);
            }
            if let Some(user) = non_empty(&format!("{prefix}_USERNAME")) {
                self.provider_entry(id).username = Some(user);
            }
            if let Some(pass) = non_empty(&format!("{prefix}_PASSWORD")) {
                self.provider_entry(id).password = Some(pass);
            }
        }

        if let Some(url) = non_empty("SWELL_DATABASE_URL").or_else(|| non_empty("DATABASE_URL")) {
            self.database_url = Some(url);
        }
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, id: ProviderId, api_key: String) {
        self.provider_entry(id).api_key = Some(api_key);
    }

    /// Set/replace a provider username and password.
    pub fn upsert_provider_login(&mut self, id: ProviderId, username: String, password: String) {
        let entry = self.provider_entry(id);
        entry.username = Some(username);
        entry.password = Some(password);
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, id: ProviderId) -> Option<&str> {
        self.provider_config(id).and_then(|cfg| cfg.api_key.as_deref())
    }

    /// Returns `(username, password)` for a provider when both are present.
    pub fn provider_login(&self, id: ProviderId) -> Option<(&str, &str)> {
        let cfg = self.provider_config(id)?;
        Some((cfg.username.as_deref()?, cfg.password.as_deref()?))
    }

    /// Whether the provider has every credential it needs.
    pub fn is_provider_configured(&self, id: ProviderId) -> bool {
        match id.credential() {
            Credential::None => true,
            Credential::ApiKey => self.provider_api_key(id).is_some(),
            Credential::Login => self.provider_login(id).is_some(),
        }
    }
}
