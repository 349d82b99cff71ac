//! Configuration for the `huddle` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/huddle/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::membership::SessionConfig;
use crate::membership::session::DEFAULT_TOPIC;
use crate::net::DEFAULT_COMMAND_CAPACITY;
use crate::transport::broker::BrokerConnector;

/// Broker used when nothing else is configured.
pub const DEFAULT_BROKER_URL: &str = "ws://127.0.0.1:9000/ws";

/// Errors that can occur when loading configuration.
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

    /// The broker URL is not a `ws://` or `wss://` URL.
    #[error("invalid broker url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The topic is empty.
    #[error("topic must not be empty")]
    EmptyTopic,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    session: SessionFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    broker_url: Option<String>,
    topic: Option<String>,
    keepalive_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    subscribe_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    name: Option<String>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Broker WebSocket URL.
    pub broker_url: String,
    /// Topic shared by the group.
    pub topic: String,
    /// Interval between keepalive pings; zero disables them.
    pub keepalive: Duration,
    /// Bound on connect plus subscribe during login.
    pub connect_timeout: Duration,
    /// How long to wait for the broker's subscribe acknowledgment.
    pub subscribe_timeout: Duration,
    /// Capacity of the shell command channel.
    pub channel_capacity: usize,

    // -- Session --
    /// Display name to log in with; prompted for when absent.
    pub name: Option<String>,
    /// Capacity of the shell event channel.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            keepalive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(5),
            channel_capacity: DEFAULT_COMMAND_CAPACITY,
            name: None,
            event_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or if the resolved broker URL or topic is unusable.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve from CLI args and a parsed config file. Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            broker_url: cli
                .broker_url
                .clone()
                .or_else(|| file.network.broker_url.clone())
                .unwrap_or(defaults.broker_url),
            topic: cli
                .topic
                .clone()
                .or_else(|| file.network.topic.clone())
                .unwrap_or(defaults.topic),
            keepalive: file
                .network
                .keepalive_secs
                .map_or(defaults.keepalive, Duration::from_secs),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            subscribe_timeout: file
                .network
                .subscribe_timeout_secs
                .map_or(defaults.subscribe_timeout, Duration::from_secs),
            channel_capacity: file
                .network
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            name: cli.name.clone().or_else(|| file.session.name.clone()),
            event_buffer: file
                .session
                .event_buffer
                .unwrap_or(defaults.event_buffer),
        }
    }

    /// Check the broker URL and topic.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] unless the URL parses with a `ws` or `wss`
    /// scheme; [`ConfigError::EmptyTopic`] for a blank topic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.broker_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.broker_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                url: self.broker_url.clone(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(())
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            topic: self.topic.clone(),
            connect_timeout: self.connect_timeout,
            event_buffer: self.event_buffer,
        }
    }

    /// Connector for the configured broker.
    #[must_use]
    pub fn broker_connector(&self) -> BrokerConnector {
        BrokerConnector::new(
            self.broker_url.clone(),
            self.keepalive,
            self.subscribe_timeout,
        )
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Decentralized presence and chat over a pub/sub broker")]
pub struct CliArgs {
    /// WebSocket URL of the broker.
    #[arg(long, env = "HUDDLE_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Topic shared by the group.
    #[arg(long, env = "HUDDLE_TOPIC")]
    pub topic: Option<String>,

    /// Display name; prompted for when omitted.
    #[arg(long, env = "HUDDLE_NAME")]
    pub name: Option<String>,

    /// Path to config file (default: `~/.config/huddle/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "HUDDLE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/huddle.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// An explicit path must exist. The default path is optional.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("huddle").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
