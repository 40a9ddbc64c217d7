use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::pipeline::RetryPolicy;

/// Where and what to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org".to_string(),
            city: "Portland".to_string(),
            api_key: None,
        }
    }
}

/// Artifact destination. Credentials are not stored here; see
/// [`StorageCredentials`](crate::StorageCredentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Fixed leading part of every artifact key.
    pub tag: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "airflowweatherapibucket".to_string(),
            region: "us-east-1".to_string(),
            tag: "current_weather_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Extra attempts per stage after the first failure.
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub poke_interval_secs: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay_secs: 120,
            poke_interval_secs: 60,
            // 7 days, the upstream sensor default.
            readiness_timeout_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl ScheduleConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn poke_interval(&self) -> Duration {
        Duration::from_secs(self.poke_interval_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// [api]
/// city = "Portland"
/// api_key = "..."
///
/// [storage]
/// bucket = "airflowweatherapibucket"
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// API key, or an error telling the user how to set one.
    pub fn api_key(&self) -> Result<&str> {
        self.api.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
            anyhow!(
                "No OpenWeather API key configured.\n\
                 Hint: run `weather-etl configure` and enter your API key."
            )
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_ok()
    }

    /// Load config from the platform location, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`, or return defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
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
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
