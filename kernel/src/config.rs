// Ledger Configuration
//
// Where the ledger container lives and how reports are styled.
// Loaded from JSON; every field falls back to its default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::export::ReportStyle;

pub const DEFAULT_CONTAINER_FILE: &str = "tag_data.tlc";
pub const DEFAULT_LOCATION: &str = "dataset";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ledger configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Container file holding the ledger.
    pub container_path: PathBuf,

    /// Section name of the ledger table inside the container.
    pub location: String,

    pub report: ReportStyle,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl LedgerConfig {
    /// Built-in configuration (used if no config is provided): the
    /// container sits in the working directory.
    pub fn default_config() -> Self {
        Self {
            container_path: PathBuf::from(DEFAULT_CONTAINER_FILE),
            location: DEFAULT_LOCATION.into(),
            report: ReportStyle::default(),
        }
    }

    /// Defaults, with the container placed in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            container_path: dir.as_ref().join(DEFAULT_CONTAINER_FILE),
            ..Self::default_config()
        }
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            LedgerConfig::from_json_str(r#"{ "container_path": "/var/lib/tags/ledger.tlc" }"#)
                .unwrap();

        assert_eq!(config.container_path, PathBuf::from("/var/lib/tags/ledger.tlc"));
        assert_eq!(config.location, DEFAULT_LOCATION);
        assert_eq!(config.report, ReportStyle::default());
    }

    #[test]
    fn report_colors_can_be_overridden() {
        let config =
            LedgerConfig::from_json_str(r##"{ "report": { "new_fill": "#00FF00" } }"##).unwrap();

        assert_eq!(config.report.new_fill, "#00FF00");
        assert_eq!(config.report.replaced_fill, ReportStyle::default().replaced_fill);
    }

    #[test]
    fn in_dir_joins_default_file() {
        let config = LedgerConfig::in_dir("/tmp/ledger");
        assert_eq!(config.container_path, Path::new("/tmp/ledger").join(DEFAULT_CONTAINER_FILE));
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = LedgerConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
