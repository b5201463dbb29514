//! Configuration management for the SFTP gateway.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/sftp-gateway/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::SftpSettings;
use crate::files::confinement;
use crate::files::transfer::{TransferOptions, DEFAULT_CHUNK_SIZE, DEFAULT_UPLOAD_MODE, MAX_CHUNK_SIZE};
use crate::gateway::{GatewayConfig, DEFAULT_MAX_DEPTH};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("root_dir must be an absolute path, got {0}")]
    RelativeRoot(String),

    #[error("chunk_size must be between 1 and 16777216, got {0}")]
    InvalidChunkSize(usize),

    #[error("upload_mode must be at most 0o7777, got {0:#o}")]
    InvalidUploadMode(u32),

    #[error("max_depth must be greater than 0")]
    InvalidMaxDepth,

    #[error("remote port must be greater than 0")]
    InvalidPort,

    #[error("api_key must not be empty")]
    EmptyApiKey,

    #[error("bind must be a socket address like 127.0.0.1:8000, got {0}")]
    InvalidBind(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Prefix of the environment variables read by [`Config::apply_env_overrides`].
pub const ENV_PREFIX: &str = "SFTP_GATEWAY_";

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Remote file service connection.
    pub remote: RemoteConfig,

    /// Confinement and transfer settings.
    pub files: FilesConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,

    /// Shared secret expected in the `X-API-Key` header.
    pub api_key: String,
}

/// Which remote backend serves file operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A real SFTP server.
    #[default]
    Sftp,
    /// The local filesystem.
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sftp" => Ok(BackendKind::Sftp),
            "local" => Ok(BackendKind::Local),
            other => Err(format!("unknown backend '{other}', expected sftp or local")),
        }
    }
}

/// Remote connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Bound on connect and authentication, in seconds.
    pub connect_timeout_secs: u64,

    /// Pinned SHA-256 host key fingerprint. Empty accepts any key.
    pub host_key_fingerprint: String,
}

/// Confinement and transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Absolute remote directory all operations are confined to.
    pub root_dir: String,

    /// Transfer chunk size in bytes (default: 1MB).
    pub chunk_size: usize,

    /// Permission bits applied to uploaded files.
    pub upload_mode: u32,

    /// Maximum directory depth for recursive removal.
    pub max_depth: usize,

    /// Maximum upload request body in bytes (0 = unlimited).
    pub max_upload_size: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            api_key: "change-me".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sftp,
            host: "127.0.0.1".to_string(),
            port: 22,
            username: "user".to_string(),
            password: "pass".to_string(),
            connect_timeout_secs: 10,
            host_key_fingerprint: String::new(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root_dir: "/home/user".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_mode: DEFAULT_UPLOAD_MODE,
            max_depth: DEFAULT_MAX_DEPTH,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sftp-gateway")
        .join("config.toml")
}

/// Unprefixed variable names read from older `.env` files, keyed by the
/// prefixed name they stand in for.
const LEGACY_ENV_NAMES: &[(&str, &str)] = &[
    ("API_KEY", "API_KEY"),
    ("SFTP_HOST", "SFTP_HOST"),
    ("SFTP_PORT", "SFTP_PORT"),
    ("SFTP_USER", "SFTP_USER"),
    ("SFTP_PASS", "SFTP_PASS"),
    ("ROOT_DIR", "BASE_DIR"),
];

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Read `SFTP_GATEWAY_<name>`, then its legacy unprefixed name, ignoring
/// unset and empty values.
fn env_value(name: &str) -> Option<String> {
    if let Some(value) = non_empty_var(&format!("{ENV_PREFIX}{name}")) {
        return Some(value);
    }

    let (_, legacy) = LEGACY_ENV_NAMES.iter().find(|(key, _)| *key == name)?;
    let value = non_empty_var(legacy)?;
    tracing::warn!(
        "Using legacy environment variable {}; rename it to {}{}",
        legacy,
        ENV_PREFIX,
        name
    );
    Some(value)
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables (all prefixed with `SFTP_GATEWAY_`):
    /// `API_KEY`, `BIND`, `BACKEND`, `SFTP_HOST`, `SFTP_PORT`, `SFTP_USER`,
    /// `SFTP_PASS`, `ROOT_DIR`, `LOG_LEVEL`.
    ///
    /// The unprefixed `API_KEY`, `SFTP_HOST`, `SFTP_PORT`, `SFTP_USER`,
    /// `SFTP_PASS` and `BASE_DIR` are still read when the prefixed form is
    /// unset.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_value("API_KEY") {
            tracing::info!("Overriding api_key from environment");
            self.server.api_key = key;
        }

        if let Some(bind) = env_value("BIND") {
            tracing::info!("Overriding bind from environment: {}", bind);
            self.server.bind = bind;
        }

        if let Some(backend) = env_value("BACKEND") {
            match backend.parse() {
                Ok(kind) => {
                    tracing::info!("Overriding backend from environment: {}", backend);
                    self.remote.backend = kind;
                }
                Err(e) => tracing::warn!("Ignoring SFTP_GATEWAY_BACKEND: {}", e),
            }
        }

        if let Some(host) = env_value("SFTP_HOST") {
            tracing::info!("Overriding remote host from environment: {}", host);
            self.remote.host = host;
        }

        if let Some(port) = env_value("SFTP_PORT") {
            match port.parse() {
                Ok(port) => {
                    tracing::info!("Overriding remote port from environment: {}", port);
                    self.remote.port = port;
                }
                Err(_) => tracing::warn!("Ignoring non-numeric SFTP port from environment: {}", port),
            }
        }

        if let Some(user) = env_value("SFTP_USER") {
            tracing::info!("Overriding remote username from environment: {}", user);
            self.remote.username = user;
        }

        if let Some(pass) = env_value("SFTP_PASS") {
            tracing::info!("Overriding remote password from environment");
            self.remote.password = pass;
        }

        if let Some(root) = env_value("ROOT_DIR") {
            tracing::info!("Overriding root_dir from environment: {}", root);
            self.files.root_dir = root;
        }

        if let Some(level) = env_value("LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }
    }

    /// Log level to start tracing with, before overrides are applied.
    pub fn effective_log_level(&self) -> String {
        env_value("LOG_LEVEL").unwrap_or_else(|| self.daemon.log_level.clone())
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.files.root_dir.starts_with('/') {
            return Err(ConfigError::RelativeRoot(self.files.root_dir.clone()));
        }

        if self.files.chunk_size == 0 || self.files.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.files.chunk_size));
        }

        if self.files.upload_mode > 0o7777 {
            return Err(ConfigError::InvalidUploadMode(self.files.upload_mode));
        }

        if self.files.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }

        if self.remote.backend == BackendKind::Sftp && self.remote.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.server.api_key.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBind(self.server.bind.clone()));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Gateway settings derived from the `[files]` section.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            root_dir: confinement::normalize(&self.files.root_dir),
            transfer: TransferOptions {
                chunk_size: self.files.chunk_size,
                upload_mode: self.files.upload_mode,
            },
            max_depth: self.files.max_depth,
        }
    }

    /// SFTP connection settings derived from the `[remote]` section.
    pub fn sftp_settings(&self) -> SftpSettings {
        let fingerprint = self.remote.host_key_fingerprint.trim();
        SftpSettings {
            host: self.remote.host.clone(),
            port: self.remote.port,
            username: self.remote.username.clone(),
            password: self.remote.password.clone(),
            connect_timeout: Duration::from_secs(self.remote.connect_timeout_secs),
            host_key_fingerprint: (!fingerprint.is_empty()).then(|| fingerprint.to_string()),
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
