use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::state::AutoPlayMode;
use crate::service::youtube::{DEFAULT_BASE_URL, MAX_PAGE_SIZE};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "audiobook";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub youtube: YouTubeConfig,
    pub playback: PlaybackConfig,
}

/// Local storage location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (empty = `<data_dir>/audiobook`)
    pub data_dir: Option<PathBuf>,
}

/// Remote relational backend (PostgREST / Supabase)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            anon_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Enabled and pointing somewhere.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }
}

/// YouTube Data API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Items per `playlistItems` page (1-50)
    pub page_size: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Playback preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// What happens when a chapter ends: "next", "repeat" or "stop"
    pub auto_play: AutoPlayMode,
    /// Saved positions at or below this are not resumed
    pub resume_min_seconds: f64,
    /// Progress save interval in milliseconds
    pub progress_interval_ms: u64,
    /// Minimum position for the "continue listening" shelf
    pub continue_min_seconds: f64,
    pub continue_limit: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_play: AutoPlayMode::Next,
            resume_min_seconds: 1.0,
            progress_interval_ms: 1000,
            continue_min_seconds: 5.0,
            continue_limit: 5,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path, creating it if missing,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            config
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without touching the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `YOUTUBE_API_KEY`, `AUDIOBOOK_REMOTE_URL` and `AUDIOBOOK_REMOTE_KEY`.
    /// A remote URL from the environment enables the remote backend.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("YOUTUBE_API_KEY") {
            self.youtube.api_key = Some(key);
        }
        if let Some(url) = var("AUDIOBOOK_REMOTE_URL") {
            self.remote.url = url;
            self.remote.enabled = true;
        }
        if let Some(key) = var("AUDIOBOOK_REMOTE_KEY") {
            self.remote.anon_key = key;
        }
    }

    /// Directory holding the local key-value database.
    pub fn data_dir(&self) -> Option<&Path> {
        self.storage.data_dir.as_deref()
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
