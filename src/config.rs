//! Configuration for the audio source and its transport
//!
//! Settings are read from a TOML file. Missing fields fall back to the
//! defaults in [`crate::constants`].
//!
//! ```toml
//! [source]
//! route = "/speech"
//! host = "0.0.0.0"
//! port = 6969
//! sample_rate = 16000
//! chunk_size = 1024
//! mute = false
//!
//! [log]
//! filter = "info"
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{ConfigError, TransportError};

/// Audio source configuration. Immutable once the source is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL path the WebSocket endpoint listens on
    pub route: String,
    /// Bind address
    pub host: String,
    /// Bind port (0 picks an ephemeral port)
    pub port: u16,
    /// Nominal sample rate of the incoming audio
    pub sample_rate: u32,
    /// Bytes per audio frame; read sizes must be a multiple of this
    pub chunk_size: usize,
    /// Bytes per sample
    pub sample_width: u16,
    /// Start muted
    pub mute: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            route: DEFAULT_ROUTE.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_width: DEFAULT_SAMPLE_WIDTH,
            mute: false,
        }
    }
}

impl SourceConfig {
    /// Check every field that would otherwise fail later at bind or read time
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sample_width == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_width",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.route.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "route",
                reason: format!("'{}' must start with '/'", self.route),
            });
        }
        if self.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: format!("'{}' is not an IP address", self.host),
            });
        }
        Ok(())
    }

    /// Socket address the transport binds to
    pub fn listen_addr(&self) -> Result<SocketAddr, TransportError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| TransportError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Path of the read-only status endpoint
    pub fn status_route(&self) -> String {
        format!("{}/status", self.route.trim_end_matches('/'))
    }

    /// Duration of one chunk in milliseconds, assuming mono audio
    pub fn chunk_duration_ms(&self) -> f32 {
        let samples = self.chunk_size as f32 / self.sample_width as f32;
        samples * 1000.0 / self.sample_rate as f32
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.source.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, else from the platform config file if it
    /// exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Platform config file location, e.g. `~/.config/ws-audio-source/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ws-audio-source").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.route, "/speech");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6969);
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.chunk_size, 1024);
        assert!(!config.mute);
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().unwrap().to_string(), "0.0.0.0:6969");
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [source]
            port = 7000
            chunk_size = 512
            mute = true
            "#,
        )
        .unwrap();
        assert_eq!(config.source.port, 7000);
        assert_eq!(config.source.chunk_size, 512);
        assert!(config.source.mute);
        assert_eq!(config.source.route, "/speech");
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = AppConfig::from_toml("[source]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "chunk_size", .. }));
    }

    #[test]
    fn test_rejects_bad_route_and_host() {
        let config = SourceConfig {
            route: "speech".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SourceConfig {
            host: "not-an-ip".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn test_status_route() {
        let config = SourceConfig::default();
        assert_eq!(config.status_route(), "/speech/status");

        let config = SourceConfig {
            route: "/".into(),
            ..Default::default()
        };
        assert_eq!(config.status_route(), "/status");
    }

    #[test]
    fn test_chunk_duration() {
        // 1024 bytes of 16-bit mono at 16kHz
        let config = SourceConfig::default();
        assert!((config.chunk_duration_ms() - 32.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
