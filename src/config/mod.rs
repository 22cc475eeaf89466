//! Configuration management for FastConvert

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Result, FastConvertError};

pub mod conversion;
pub use conversion::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Upload directory and codec settings
    pub conversion: ConversionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,

    /// Port to listen on
    pub port: u16,

    /// Multipart field carrying the uploaded files
    pub upload_field: String,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8083,
            upload_field: "files".to_string(),
            max_body_bytes: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl ServerConfig {
    /// Socket address the server binds to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FastConvertError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(FastConvertError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| FastConvertError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| FastConvertError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(FastConvertError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| FastConvertError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.conversion.validate()?;

        if self.server.upload_field.trim().is_empty() {
            return Err(FastConvertError::config("Upload field name must not be empty"));
        }

        if self.server.max_body_bytes == 0 {
            return Err(FastConvertError::config(
                "max_body_bytes must be greater than 0"
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(FastConvertError::config("Log level must not be empty"));
        }

        Ok(())
    }
}
