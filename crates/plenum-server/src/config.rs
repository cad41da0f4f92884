//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Voice synthesis settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Voice synthesis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Base URL of the ElevenLabs-compatible synthesis API.
    #[serde(default = "default_synthesis_base_url")]
    pub synthesis_base_url: String,

    /// API key for the synthesis provider. Empty means voice responses are
    /// rejected with an error rather than attempted.
    #[serde(default)]
    pub api_key: String,

    /// Voice used when a request does not name one.
    #[serde(default = "default_voice")]
    pub default_voice: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "plenum_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "plenum.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_synthesis_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            synthesis_base_url: default_synthesis_base_url(),
            api_key: String::new(),
            default_voice: default_voice(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PLENUM_HOST` overrides `server.host`
/// - `PLENUM_PORT` overrides `server.port`
/// - `PLENUM_DB_PATH` overrides `database.path`
/// - `PLENUM_SYNTH_BASE_URL` overrides `voice.synthesis_base_url`
/// - `PLENUM_SYNTH_API_KEY` overrides `voice.api_key`
/// - `PLENUM_DEFAULT_VOICE` overrides `voice.default_voice`
/// - `PLENUM_LOG_LEVEL` overrides `logging.level`
/// - `PLENUM_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("PLENUM_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PLENUM_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("PLENUM_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(base_url) = std::env::var("PLENUM_SYNTH_BASE_URL") {
        config.voice.synthesis_base_url = base_url;
    }
    if let Ok(api_key) = std::env::var("PLENUM_SYNTH_API_KEY") {
        config.voice.api_key = api_key;
    }
    if let Ok(voice) = std::env::var("PLENUM_DEFAULT_VOICE") {
        config.voice.default_voice = voice;
    }
    if let Ok(level) = std::env::var("PLENUM_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PLENUM_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
