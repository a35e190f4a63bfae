//! TOML-based configuration for the connexion monitor.
//!
//! Reads and writes `MonitorConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Connexion\config.toml`
//! - Linux:    `~/.config/connexion/config.toml`
//! - macOS:    `~/Library/Application Support/Connexion/config.toml`
//!
//! Example file:
//!
//! ```toml
//! log_level = "debug"
//!
//! [client]
//! signature = "CxMn"
//! name = "Connexion Monitor"
//! mode = "plugin"
//! capability_mask = 16128
//!
//! [peer]
//! timeout_ms = 500
//!
//! [dispatch]
//! dominant = true
//! drift_threshold = 4
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section and
//! a missing key all fall back to the values below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use connexion_core::protocol::messages::{ButtonMask, CapabilityMask, ClientMode, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::DispatchOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field parsed as TOML but holds a value the protocol cannot use.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level monitor configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// The client the monitor registers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Four-character application signature; `"****"` claims the wildcard.
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_mode")]
    pub mode: ClientMode,
    #[serde(default = "default_capability_mask")]
    pub capability_mask: u32,
    #[serde(default = "default_button_mask")]
    pub button_mask: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerConfig {
    /// Upper bound on any driver round-trip, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Mirrors [`DispatchOptions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "default_true")]
    pub edge_detection: bool,
    #[serde(default)]
    pub dominant: bool,
    #[serde(default)]
    pub drift_threshold: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_signature() -> String {
    "CxMn".to_string()
}
fn default_name() -> String {
    "Connexion Monitor".to_string()
}
fn default_mode() -> ClientMode {
    ClientMode::TakeOver
}
fn default_capability_mask() -> u32 {
    CapabilityMask::ALL
}
fn default_button_mask() -> u32 {
    ButtonMask::ALL
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client: ClientConfig::default(),
            peer: PeerConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            signature: default_signature(),
            name: default_name(),
            mode: default_mode(),
            capability_mask: default_capability_mask(),
            button_mask: default_button_mask(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            edge_detection: default_true(),
            dominant: false,
            drift_threshold: 0,
        }
    }
}

// ── Typed accessors ───────────────────────────────────────────────────────────

impl MonitorConfig {
    /// The configured signature as a protocol value.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] unless the string is exactly four ASCII
    /// characters.
    pub fn signature(&self) -> Result<Signature, ConfigError> {
        self.client
            .signature
            .parse()
            .map_err(|e: connexion_core::ProtocolError| ConfigError::InvalidValue {
                field: "client.signature",
                reason: e.to_string(),
            })
    }

    pub fn capability_mask(&self) -> CapabilityMask {
        CapabilityMask(self.client.capability_mask)
    }

    pub fn button_mask(&self) -> ButtonMask {
        ButtonMask(self.client.button_mask)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.peer.timeout_ms)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            edge_detection: self.dispatch.edge_detection,
            dominant: self.dispatch.dominant,
            drift_threshold: self.dispatch.drift_threshold,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the platform location, or defaults if absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<MonitorConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `MonitorConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<MonitorConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MonitorConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &MonitorConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &MonitorConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `connexion` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Connexion"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("connexion"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Connexion"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
