//! Broker settings.
//!
//! Each setting is taken from the first layer that provides it: CLI flag,
//! environment variable (clap `env`), the `[server]` table of
//! `~/.config/huddle-broker/config.toml`, then the compiled default. The
//! merged values are validated before the broker binds anything.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::broker::DEFAULT_MAX_PAYLOAD_SIZE;

/// Address the broker listens on when nothing else is configured.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9000";

/// Errors that can occur when loading broker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The bind address is not `host:port` with a literal IP.
    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddr {
        /// Address as configured.
        addr: String,
        /// Parser error.
        source: std::net::AddrParseError,
    },

    /// A zero payload limit would reject every publish.
    #[error("max_payload_size must be greater than zero")]
    ZeroPayloadLimit,
}

/// Settings that may come from any layer. Unset fields fall through.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerLayer {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

impl ServerLayer {
    /// Fill unset fields of `self` from `lower`.
    fn over(self, lower: Self) -> Self {
        Self {
            bind_addr: self.bind_addr.or(lower.bind_addr),
            max_payload_size: self.max_payload_size.or(lower.max_payload_size),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BrokerConfigFile {
    server: ServerLayer,
}

/// CLI arguments for the broker.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Huddle pub/sub broker")]
pub struct BrokerCliArgs {
    /// Address to listen on, as `ip:port`.
    #[arg(short, long, env = "HUDDLE_BROKER_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/huddle-broker/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest publish payload accepted, in bytes.
    #[arg(long, env = "HUDDLE_BROKER_MAX_PAYLOAD")]
    pub max_payload_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "HUDDLE_BROKER_LOG")]
    pub log_level: String,
}

impl BrokerCliArgs {
    fn layer(&self) -> ServerLayer {
        ServerLayer {
            bind_addr: self.bind.clone(),
            max_payload_size: self.max_payload_size,
        }
    }
}

/// Validated broker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Socket address to listen on.
    pub bind_addr: SocketAddr,
    /// Largest accepted publish payload in bytes; never zero.
    pub max_payload_size: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl BrokerConfig {
    /// Load and validate the configuration for `cli`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if an explicit config file cannot be read, any file
    /// fails to parse, or the merged values are invalid.
    pub fn load(cli: &BrokerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::from_layer(cli.layer().over(file.server), &cli.log_level)
    }

    fn from_layer(layer: ServerLayer, log_level: &str) -> Result<Self, ConfigError> {
        let raw_addr = layer
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                addr: raw_addr.clone(),
                source,
            })?;

        let max_payload_size = layer.max_payload_size.unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);
        if max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadLimit);
        }

        Ok(Self {
            bind_addr,
            max_payload_size,
            log_level: log_level.to_string(),
        })
    }
}

/// Read the explicit file, or the default one if it exists.
fn load_config_file(explicit_path: Option<&Path>) -> Result<BrokerConfigFile, ConfigError> {
    if let Some(path) = explicit_path {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(path) = dirs::config_dir().map(|dir| dir.join("huddle-broker").join("config.toml"))
    else {
        return Ok(BrokerConfigFile::default());
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BrokerConfigFile::default()),
        Err(source) => Err(ConfigError::ReadFile { path, source }),
    }
}
