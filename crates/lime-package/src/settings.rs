//! Runtime settings derived from lime configuration

use crate::archive::Compression;
use crate::names::NamedEnum;
use crate::Result;
use lime_config::loader::DEFAULT_COMPRESSION_LEVEL;
use lime_config::{Config, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

/// How archives are built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub compression: Compression,
    pub level: u32,
}

impl ArchiveSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let compression =
            Compression::parse_name(&config.compression()).map_err(|e| ConfigError::InvalidValue {
                field: "archive.compression".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            compression,
            level: config.compression_level(),
        })
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            compression: Compression::Deflate,
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// How the lifecycle engine runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Longest a single action item may run
    pub trigger_timeout: Duration,
    /// Filesystem root packages install into
    pub root: PathBuf,
    pub status_file: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trigger_timeout: config.trigger_timeout(),
            root: config.root(),
            status_file: config.status_file(),
        }
    }

    pub fn with_trigger_timeout(mut self, timeout: Duration) -> Self {
        self.trigger_timeout = timeout;
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackageError;
    use lime_config::loader::DEFAULT_TRIGGER_TIMEOUT_MS;
    use lime_config::ArchiveSection;

    #[test]
    fn test_defaults() {
        let archive = ArchiveSettings::default();
        assert_eq!(archive.compression, Compression::Deflate);
        assert_eq!(archive.level, 6);

        let engine = EngineSettings::default();
        assert_eq!(
            engine.trigger_timeout,
            Duration::from_millis(DEFAULT_TRIGGER_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_from_default_config() {
        let config = Config::default();
        assert_eq!(
            ArchiveSettings::from_config(&config).unwrap(),
            ArchiveSettings::default()
        );
    }

    #[test]
    fn test_unknown_compression_is_a_config_error() {
        let mut config = Config::default();
        config.settings.archive = Some(ArchiveSection {
            compression: Some("zip".to_string()),
            ..ArchiveSection::default()
        });

        assert!(matches!(
            ArchiveSettings::from_config(&config),
            Err(PackageError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "archive.compression"
        ));
    }
}
