use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consumers::HighlightConfig;
use crate::net::{ConnectionConfig, DEFAULT_PORT};
use crate::scene::{DEFAULT_KEYFRAME_RATE, TransformMode};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host` or `host:port`; overridden by the `server_hostname` launch parameter.
    pub server_locations: Vec<String>,
    pub default_port: u16,
    pub send_period_ms: u64,
    /// Assumed keyframe rate until inbound traffic has been measured.
    pub keyframe_rate: f32,
    pub transform_mode: TransformMode,
    pub text_pool_size: usize,
    pub connection: ConnectionConfig,
    pub highlights: HighlightConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_locations: vec!["127.0.0.1".to_string()],
            default_port: DEFAULT_PORT,
            send_period_ms: 100,
            keyframe_rate: DEFAULT_KEYFRAME_RATE,
            transform_mode: TransformMode::Interpolated,
            text_pool_size: 32,
            connection: ConnectionConfig::default(),
            highlights: HighlightConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn send_period(&self) -> Duration {
        Duration::from_millis(self.send_period_ms.max(1))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.connection = config.connection.sanitized();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_error)
    }

    /// Reads the config at `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        log::info!("Wrote default config to {}", path.display());
        Ok(config)
    }
}
