//! Log output configuration and subscriber setup
//!
//! The level string is an `EnvFilter` directive, so per-crate levels such as
//! `"info,tributary_core=trace"` are accepted. `RUST_LOG`, when set, wins over
//! the configured level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::ConfigError;

/// Output layout for the fmt subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Single-line, abbreviated fields
    #[default]
    Compact,
    /// Multi-line, human-oriented
    Pretty,
    /// Single-line with every span field
    Full,
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Output layout
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Reject level strings that are not valid filter directives
    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level).map_err(|e| ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            value: format!("{:?}: {}", self.level, e),
        })?;
        Ok(())
    }

    fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            value: format!("{:?}: {}", self.level, e),
        })
    }
}

/// Install the global `tracing` subscriber described by `config`
///
/// Fails with [`ConfigError::Logging`] if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("info" ; "plain level")]
    #[test_case("warn,tributary_core=trace" ; "per crate directive")]
    #[test_case("tributary_core::dispatch=debug" ; "module path")]
    fn test_valid_levels(level: &str) {
        let config = LoggingConfig {
            level: level.to_string(),
            format: LogFormat::Compact,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "tributary_core=loud".to_string(),
            format: LogFormat::Compact,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test_case("\"compact\"", LogFormat::Compact)]
    #[test_case("\"pretty\"", LogFormat::Pretty)]
    #[test_case("\"full\"", LogFormat::Full)]
    fn test_format_names(raw: &str, expected: LogFormat) {
        let parsed: LoggingConfig = toml::from_str(&format!("format = {raw}")).unwrap();
        assert_eq!(parsed.format, expected);
        assert_eq!(parsed.level, "info");
    }
}
