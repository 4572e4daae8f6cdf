//! Persisted CA preference configuration.
//!
//! The preference file names, from most to least specific, which ECM PID a
//! channel should use, which providers and which CA system types are
//! preferred:
//!
//! ```toml
//! fill_out = false
//!
//! [[channels]]
//! tsid = 1101
//! sid = 28006
//! pmt_pid = 100
//! ecm_pid = 1537
//! emm_pid = 1793
//!
//! [[providers]]
//! id = 264208
//!
//! [[ca_types]]
//! id = 1280
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the preference store inside the plugin configuration directory.
pub const PREFERENCES_FILE: &str = "provid.toml";

/// Errors reading or writing a TOML-backed store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse TOML file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Channel-level preference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub tsid: u16,
    pub sid: u16,
    pub pmt_pid: u16,
    pub ecm_pid: u16,
    /// Replaces the EMM PID of the chosen CA system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emm_pid: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Provider-level preference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreference {
    pub id: u32,
}

/// CA-system-type-level preference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaTypePreference {
    pub id: u16,
}

/// Contents of the preference file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceConfig {
    /// Append stubs for unconfigured services. Missing means "never asked".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_out: Option<bool>,
    #[serde(default)]
    pub channels: Vec<ChannelPreference>,
    #[serde(default)]
    pub providers: Vec<ProviderPreference>,
    #[serde(default)]
    pub ca_types: Vec<CaTypePreference>,
}

/// Where preferences are read from and appended to.
pub trait PreferenceStore {
    /// Load the configuration. `Ok(None)` means there is none yet.
    fn load(&self) -> Result<Option<PreferenceConfig>, StoreError>;

    fn save(&self, config: &PreferenceConfig) -> Result<(), StoreError>;
}

/// TOML file backed store.
#[derive(Debug, Clone)]
pub struct TomlPreferenceStore {
    path: PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self) -> Result<Option<PreferenceConfig>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&contents)?))
    }

    fn save(&self, config: &PreferenceConfig) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, toml::to_string_pretty(config)?)?;
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    config: Mutex<Option<PreferenceConfig>>,
}

impl MemoryPreferenceStore {
    pub fn new(config: Option<PreferenceConfig>) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Option<PreferenceConfig> {
        self.config.lock().clone()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<PreferenceConfig>, StoreError> {
        Ok(self.config.lock().clone())
    }

    fn save(&self, config: &PreferenceConfig) -> Result<(), StoreError> {
        *self.config.lock() = Some(config.clone());
        Ok(())
    }
}
