//! Logging bootstrap
//!
//! Installs a `tracing` subscriber using the filter and format from the merged
//! configuration. `RUST_LOG` is not consulted; `LIME_LOG` already feeds the
//! configured level.

use crate::loader::Config;
use crate::settings::LogFormat;
use crate::{ConfigError, ConfigResult};
use tracing_subscriber::EnvFilter;

/// Build the filter for a directive such as "info" or "lime_package=debug"
pub fn filter_for(level: &str) -> ConfigResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidValue {
        field: "logging.level".to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(config: &Config) -> ConfigResult<()> {
    let filter = filter_for(config.log_level())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.log_format() {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        assert!(filter_for("info").is_ok());
        assert!(filter_for("lime_package=debug,warn").is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        assert!(filter_for("lime_package=loud").is_err());
    }
}
