//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{validate_compression, ConfigFile, LogFormat, MAX_COMPRESSION_LEVEL};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "lime.toml";

/// Default compression for new archives
pub const DEFAULT_COMPRESSION: &str = "deflate";

/// Default DEFLATE level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default upper bound for one action item or trigger
pub const DEFAULT_TRIGGER_TIMEOUT_MS: u64 = 30_000;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.lime/config.toml) - lowest priority
/// 2. Project config (./lime.toml) - overrides global
/// 3. Environment variables (LIME_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective settings after merging every layer
    pub settings: ConfigFile,

    /// Directory where lime.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.lime/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find lime.toml, then layers it over the
    /// global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        self.assemble(project_root, project)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = ConfigFile::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_root, Some(project))
    }

    fn assemble(
        &mut self,
        project_root: Option<PathBuf>,
        project: Option<ConfigFile>,
    ) -> ConfigResult<Config> {
        let mut settings = self.load_global_config()?;
        if let Some(project) = project {
            settings.merge(&project);
        }
        apply_env_overrides(&mut settings)?;
        settings.validate()?;

        tracing::debug!(
            project_root = ?project_root,
            "configuration loaded"
        );

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, Option<ConfigFile>)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ConfigFile::load_from_file(&config_path)?;
                return Ok((Some(current), Some(project_config)));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, None)),
            }
        }
    }

    /// Load global configuration, which is optional
    fn load_global_config(&mut self) -> ConfigResult<ConfigFile> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match ConfigFile::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory means no global layer
                Err(ConfigError::HomeNotFound) => return Ok(ConfigFile::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(ConfigFile::default());
        }

        ConfigFile::load_from_file(&path)
    }

    /// Get the global configuration directory (~/.lime)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lime"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides
///
/// Recognized variables: LIME_COMPRESSION, LIME_COMPRESSION_LEVEL,
/// LIME_TRIGGER_TIMEOUT_MS, LIME_ROOT, LIME_LOG
fn apply_env_overrides(settings: &mut ConfigFile) -> ConfigResult<()> {
    if let Ok(compression) = env::var("LIME_COMPRESSION") {
        validate_compression("LIME_COMPRESSION", &compression)?;
        settings
            .archive
            .get_or_insert_with(Default::default)
            .compression = Some(compression.to_lowercase());
    }

    if let Ok(level) = env::var("LIME_COMPRESSION_LEVEL") {
        let level = parse_env_number("LIME_COMPRESSION_LEVEL", &level)?;
        let level = u32::try_from(level).unwrap_or(u32::MAX);
        if level > MAX_COMPRESSION_LEVEL {
            return Err(ConfigError::InvalidValue {
                field: "LIME_COMPRESSION_LEVEL".to_string(),
                reason: format!("must be between 0 and {}", MAX_COMPRESSION_LEVEL),
            });
        }
        settings.archive.get_or_insert_with(Default::default).level = Some(level);
    }

    if let Ok(timeout) = env::var("LIME_TRIGGER_TIMEOUT_MS") {
        let timeout = parse_env_number("LIME_TRIGGER_TIMEOUT_MS", &timeout)?;
        settings
            .engine
            .get_or_insert_with(Default::default)
            .trigger_timeout_ms = Some(timeout);
    }

    if let Ok(root) = env::var("LIME_ROOT") {
        settings.engine.get_or_insert_with(Default::default).root = Some(PathBuf::from(root));
    }

    if let Ok(level) = env::var("LIME_LOG") {
        settings.logging.get_or_insert_with(Default::default).level = Some(level);
    }

    Ok(())
}

fn parse_env_number(field: &str, value: &str) -> ConfigResult<u64> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("expected a number, got '{}'", value),
    })
}

impl Config {
    /// Effective compression name (lowercase)
    pub fn compression(&self) -> String {
        self.settings
            .archive
            .as_ref()
            .and_then(|a| a.compression.as_deref())
            .unwrap_or(DEFAULT_COMPRESSION)
            .to_lowercase()
    }

    /// Effective DEFLATE level
    pub fn compression_level(&self) -> u32 {
        self.settings
            .archive
            .as_ref()
            .and_then(|a| a.level)
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
    }

    /// Effective timeout for one action item or trigger
    pub fn trigger_timeout(&self) -> Duration {
        let millis = self
            .settings
            .engine
            .as_ref()
            .and_then(|e| e.trigger_timeout_ms)
            .unwrap_or(DEFAULT_TRIGGER_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    /// Installation root (defaults to "/")
    pub fn root(&self) -> PathBuf {
        self.settings
            .engine
            .as_ref()
            .and_then(|e| e.root.clone())
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    /// Status database path (defaults to <root>/var/lib/lime/status.yaml)
    pub fn status_file(&self) -> PathBuf {
        self.settings
            .engine
            .as_ref()
            .and_then(|e| e.status_file.clone())
            .unwrap_or_else(|| self.root().join("var/lib/lime/status.yaml"))
    }

    /// Log filter directive (defaults to "info")
    pub fn log_level(&self) -> &str {
        self.settings
            .logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    /// Log output format
    pub fn log_format(&self) -> LogFormat {
        self.settings
            .logging
            .as_ref()
            .and_then(|l| l.format)
            .unwrap_or_default()
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a lime.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::with_global_config_path(dir.join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[archive]
compression = "none"
"#,
        );

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.compression(), "none");
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[engine]
trigger_timeout_ms = 1500
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.trigger_timeout(), Duration::from_millis(1500));
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_defaults_without_any_file() {
        let config = Config::default();

        assert_eq!(config.compression(), DEFAULT_COMPRESSION);
        assert_eq!(config.compression_level(), DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(
            config.trigger_timeout(),
            Duration::from_millis(DEFAULT_TRIGGER_TIMEOUT_MS)
        );
        assert_eq!(config.root(), PathBuf::from("/"));
        assert_eq!(
            config.status_file(),
            PathBuf::from("/var/lib/lime/status.yaml")
        );
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    #[serial]
    fn test_env_override_compression() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[archive]
compression = "none"
"#,
        );

        env::set_var("LIME_COMPRESSION", "DEFLATE");

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        env::remove_var("LIME_COMPRESSION");

        assert_eq!(config.compression(), "deflate");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_timeout() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("LIME_TRIGGER_TIMEOUT_MS", "soon");

        let mut loader = isolated_loader(temp_dir.path());
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("LIME_TRIGGER_TIMEOUT_MS");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
