//! `tvcard.toml` configuration.
//!
//! ```toml
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//! level = "debug"
//!
//! [mdapi]
//! config_dir = "MDPLUGINS"
//!
//! [tuning]
//! diseqc_repeats = 1
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File looked for in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tvcard.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub mdapi: MdapiSection,
    #[serde(default)]
    pub tuning: TuningSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    pub log_dir: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MdapiSection {
    /// Directory holding `cards.toml` and `provid.toml`.
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TuningSection {
    pub diseqc_repeats: Option<u32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit`, else `tvcard.toml` in the working directory if it
    /// exists, else defaults. Returns the path that was read.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = explicit.map(Path::to_path_buf).or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            default_path.exists().then_some(default_path)
        });
        match path {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: ConfigFile = toml::from_str(
            r#"
            [logging]
            log_dir = "/var/log/tvcard"
            retention_days = 3

            [mdapi]
            config_dir = "MDPLUGINS"

            [tuning]
            diseqc_repeats = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.log_dir, Some(PathBuf::from("/var/log/tvcard")));
        assert_eq!(config.logging.retention_days, Some(3));
        assert_eq!(config.logging.level, None);
        assert_eq!(config.mdapi.config_dir, Some(PathBuf::from("MDPLUGINS")));
        assert_eq!(config.tuning.diseqc_repeats, Some(2));
    }

    #[test]
    fn test_sections_are_optional() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert!(config.mdapi.config_dir.is_none());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tvcard.toml");
        std::fs::write(&path, "[tuning]\ndiseqc_repeats = \"x\"\n").unwrap();

        let err = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("tvcard.toml"));

        assert!(matches!(
            ConfigFile::discover(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }
}
