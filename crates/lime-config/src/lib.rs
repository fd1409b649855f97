//! Lime Configuration System
//!
//! Provides configuration management for the lime packaging tools:
//! - Global user configuration (~/.lime/config.toml)
//! - Project configuration (lime.toml)
//! - Environment variable overrides (LIME_*)
//! - Logging bootstrap driven by the merged configuration
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.lime/config.toml)
//! 2. Project config (./lime.toml, searched upwards)
//! 3. Environment variables (LIME_*)
//!
//! # Example
//!
//! ```no_run
//! use lime_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("trigger timeout: {:?}", config.trigger_timeout());
//! ```

pub mod loader;
pub mod logging;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{ArchiveSection, ConfigFile, EngineSection, LogFormat, LoggingSection};
