//! Configuration files (~/.lime/config.toml and lime.toml)
//!
//! Both files share one schema; the loader layers them on top of each other.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compression names accepted in `[archive] compression`
pub const COMPRESSION_NAMES: &[&str] = &["none", "deflate"];

/// Highest DEFLATE level accepted in `[archive] level`
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Contents of a lime configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Package archive settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveSection>,

    /// Lifecycle engine settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineSection>,

    /// Logging settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSection>,
}

/// `[archive]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    /// Compression applied to file payloads ("none" or "deflate")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    /// DEFLATE level (0-9)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

/// `[engine]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Root directory package files are installed under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Status database location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,

    /// Upper bound for a single action item or trigger, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_timeout_ms: Option<u64>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive, e.g. "info" or "lime_package=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

impl ConfigFile {
    /// Load a configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(archive) = &self.archive {
            if let Some(compression) = &archive.compression {
                validate_compression("archive.compression", compression)?;
            }
            if let Some(level) = archive.level {
                if level > MAX_COMPRESSION_LEVEL {
                    return Err(ConfigError::InvalidValue {
                        field: "archive.level".to_string(),
                        reason: format!(
                            "must be between 0 and {}, got {}",
                            MAX_COMPRESSION_LEVEL, level
                        ),
                    });
                }
            }
        }

        if let Some(engine) = &self.engine {
            if engine.trigger_timeout_ms == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "engine.trigger_timeout_ms".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the global config file path (~/.lime/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lime").join("config.toml"))
    }

    /// Merge another config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ConfigFile) {
        if let Some(theirs) = &other.archive {
            let ours = self.archive.get_or_insert_with(Default::default);
            if theirs.compression.is_some() {
                ours.compression = theirs.compression.clone();
            }
            if theirs.level.is_some() {
                ours.level = theirs.level;
            }
        }
        if let Some(theirs) = &other.engine {
            let ours = self.engine.get_or_insert_with(Default::default);
            if theirs.root.is_some() {
                ours.root = theirs.root.clone();
            }
            if theirs.status_file.is_some() {
                ours.status_file = theirs.status_file.clone();
            }
            if theirs.trigger_timeout_ms.is_some() {
                ours.trigger_timeout_ms = theirs.trigger_timeout_ms;
            }
        }
        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            if theirs.level.is_some() {
                ours.level = theirs.level.clone();
            }
            if theirs.format.is_some() {
                ours.format = theirs.format;
            }
        }
    }
}

/// Validate a compression name
pub(crate) fn validate_compression(field: &str, value: &str) -> ConfigResult<()> {
    if !COMPRESSION_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(value))
    {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be 'none' or 'deflate', got '{}'", value),
        });
    }
    Ok(())
}
