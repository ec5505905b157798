//! Configuration management.
//!
//! flowcanvas configuration can come from:
//! - Environment variables (FLOWCANVAS_*)
//! - Config file (~/.config/flowcanvas/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::workflow::GeneratorKind;

/// flowcanvas configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Job polling configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Generation back-end connection
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Job polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sleep between status polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll budget for image jobs
    #[serde(default = "default_image_max_attempts")]
    pub image_max_attempts: u32,

    /// Poll budget for video jobs
    #[serde(default = "default_video_max_attempts")]
    pub video_max_attempts: u32,

    /// Poll budget for upscale jobs
    #[serde(default = "default_upscale_max_attempts")]
    pub upscale_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            image_max_attempts: default_image_max_attempts(),
            video_max_attempts: default_video_max_attempts(),
            upscale_max_attempts: default_upscale_max_attempts(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll budget for a generator kind. Never zero.
    pub fn max_attempts(&self, kind: GeneratorKind) -> u32 {
        let attempts = match kind {
            GeneratorKind::Image => self.image_max_attempts,
            GeneratorKind::Video => self.video_max_attempts,
            GeneratorKind::Upscale => self.upscale_max_attempts,
        };
        attempts.max(1)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_image_max_attempts() -> u32 {
    60 // ~1 minute
}

fn default_video_max_attempts() -> u32 {
    300 // ~5 minutes
}

fn default_upscale_max_attempts() -> u32 {
    120
}

/// Generation back-end connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the generation API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&primary_path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML text without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let partial: PartialConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        let mut config = Self::default();
        config.apply_partial(partial);
        Ok(config)
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("flowcanvas"))
            .unwrap_or_else(|| PathBuf::from(".flowcanvas"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FLOWCANVAS_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(key) = std::env::var("FLOWCANVAS_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Ok(timeout) = std::env::var("FLOWCANVAS_BACKEND_TIMEOUT_SECONDS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.backend.timeout_seconds = parsed;
            }
        }
        if let Ok(interval) = std::env::var("FLOWCANVAS_POLL_INTERVAL_MS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                self.engine.poll_interval_ms = parsed;
            }
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(engine) = partial.engine {
            self.engine = engine;
        }
        if let Some(backend) = partial.backend {
            self.backend = backend;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    engine: Option<EngineConfig>,
    backend: Option<BackendConfig>,
}
