use super::ProxyConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reads, overrides and validates a [`ProxyConfig`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `path`, or fall back to the built-in test camera catalog.
    pub async fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_file(path).await?,
            None => {
                debug!("No config file given, using built-in camera catalog");
                ProxyConfig::with_test_camera()
            }
        };
        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    pub async fn load_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Loaded config from {} with {} cameras",
            path.display(),
            config.cameras.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<ProxyConfig, toml::de::Error> {
        let mut config: ProxyConfig = toml::from_str(content)?;
        config.assign_camera_ids();
        Ok(config)
    }
}

impl ProxyConfig {
    pub fn merge_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("CAMPROXY_BIND") {
            match bind.parse() {
                Ok(addr) => self.server.bind = addr,
                Err(e) => tracing::warn!("Ignoring CAMPROXY_BIND={}: {}", bind, e),
            }
        }

        if let Ok(dir) = std::env::var("CAMPROXY_STREAMS_DIR") {
            self.server.streams_dir = PathBuf::from(dir);
        }

        if let Ok(binary) = std::env::var("CAMPROXY_FFMPEG") {
            self.transcoder.binary = binary;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transcoder.binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "transcoder.binary must not be empty".into(),
            ));
        }
        if self.relay.chunk_size == 0 {
            return Err(ConfigError::Invalid("relay.chunk_size must be > 0".into()));
        }
        if self.segmented.playlist_length == 0 {
            return Err(ConfigError::Invalid(
                "segmented.playlist_length must be > 0".into(),
            ));
        }
        if self.segmented.segment_duration == 0 {
            return Err(ConfigError::Invalid(
                "segmented.segment_duration must be > 0".into(),
            ));
        }

        for (id, camera) in &self.cameras {
            if camera.port == 0 {
                return Err(ConfigError::Invalid(format!("camera {id}: port must be > 0")));
            }
            let uri = camera.source_uri();
            let parsed = url::Url::parse(&uri)
                .map_err(|e| ConfigError::Invalid(format!("camera {id}: {uri}: {e}")))?;
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(ConfigError::Invalid(format!(
                    "camera {id}: missing host in {uri}"
                )));
            }
        }

        Ok(())
    }
}
