//! Client configuration.
//!
//! Layered as built-in defaults, then the TOML file under the platform config
//! directory, then `PARLEY__`-prefixed environment variables
//! (`PARLEY__SERVER__API_URL`, `PARLEY__TIMING__TYPING_IDLE_MS`, ...).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ParleyError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Local identity; prompted for when absent
    pub user_id: Option<String>,
    pub log_level: String,
    pub server: ServerSettings,
    pub timing: TimingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            log_level: "info".to_string(),
            server: ServerSettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub api_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub typing_idle_ms: u64,
    pub message_notification_ms: u64,
    pub aggregate_notification_ms: u64,
    pub roster_refresh_secs: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            typing_idle_ms: 2000,
            message_notification_ms: 4000,
            aggregate_notification_ms: 5000,
            roster_refresh_secs: 15,
        }
    }
}

impl TimingSettings {
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn message_notification(&self) -> Duration {
        Duration::from_millis(self.message_notification_ms)
    }

    pub fn aggregate_notification(&self) -> Duration {
        Duration::from_millis(self.aggregate_notification_ms)
    }

    /// Never zero; `tokio::time::interval` panics on a zero period.
    pub fn roster_refresh(&self) -> Duration {
        Duration::from_secs(self.roster_refresh_secs.max(1))
    }
}

/// Normalize and check a local identity.
pub fn validate_user_id(raw: &str) -> Result<String> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ParleyError::InvalidIdentity("identity is empty".to_string()));
    }
    if id.chars().count() < 3 {
        return Err(ParleyError::InvalidIdentity(format!(
            "'{}' is shorter than 3 characters",
            id
        )));
    }
    Ok(id.to_string())
}

pub struct ConfigService {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load from the default location.
    pub fn new() -> Result<Self> {
        Self::load(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("config.toml")
    }

    /// Load from `path`. A missing file just means defaults.
    pub fn load(path: PathBuf) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<AppConfig>()?;

        log::debug!("Loaded configuration from {}", path.display());
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    /// Replace the configuration and persist it.
    pub fn update(&mut self, config: AppConfig) -> Result<()> {
        self.config = config;
        self.save()
    }

    pub fn set_user_id(&mut self, raw: &str) -> Result<String> {
        let id = validate_user_id(raw)?;
        let mut config = self.get();
        config.user_id = Some(id.clone());
        self.update(config)?;
        Ok(id)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(&self.config)
            .map_err(|e| ParleyError::Config(format!("Failed to encode config: {}", e)))?;
        std::fs::write(&self.path, contents)?;
        log::info!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}
