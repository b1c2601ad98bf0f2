//! Engine configuration sections

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::ConfigError;

/// Top-level configuration for an event coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Dispatcher queueing and path pooling
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Event instance pooling
    #[serde(default)]
    pub pool: PoolConfig,

    /// Observability side tables
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EventsConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tributary_config::EventsConfig;
    ///
    /// let config = EventsConfig::load("tributary.toml")?;
    /// assert!(config.dispatcher.path_depth_hint > 0);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loading events config");
        Self::from_toml_str(&contents)
    }

    /// Check values that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.path_depth_hint == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatcher.path_depth_hint".to_string(),
                value: "must be greater than zero".to_string(),
            });
        }
        if self.dispatcher.target_count_hint == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatcher.target_count_hint".to_string(),
                value: "must be greater than zero".to_string(),
            });
        }
        self.logging.validate()
    }
}

/// Dispatcher queueing and path pooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Ignore gates and process every dispatch synchronously
    pub immediate: bool,

    /// Spare event queues kept for reuse across drains
    pub queue_pool_capacity: usize,

    /// Spare propagation paths kept for reuse across dispatches
    pub path_pool_capacity: usize,

    /// Initial capacity of the trickle-down and bubble-up lists
    pub path_depth_hint: usize,

    /// Initial capacity of the target-set list
    pub target_count_hint: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            immediate: false,
            queue_pool_capacity: 8,
            path_pool_capacity: 16,
            path_depth_hint: 16,
            target_count_hint: 4,
        }
    }
}

/// Event instance pooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Free instances retained per event type (0 keeps every released instance)
    pub max_pooled_per_type: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pooled_per_type: 128,
        }
    }
}

/// Observability side tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Record the call site of every callback registration
    pub listeners: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EventsConfig::from_toml_str("").unwrap();
        assert_eq!(config, EventsConfig::default());
        assert_eq!(config.dispatcher.path_depth_hint, 16);
        assert_eq!(config.pool.max_pooled_per_type, 128);
        assert!(!config.tracking.listeners);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = EventsConfig::from_toml_str(
            r#"
            [dispatcher]
            immediate = true
            "#,
        )
        .unwrap();

        assert!(config.dispatcher.immediate);
        assert_eq!(config.dispatcher.queue_pool_capacity, 8);
        assert_eq!(config.dispatcher.target_count_hint, 4);
    }

    #[test]
    fn test_full_document() {
        let config = EventsConfig::from_toml_str(
            r#"
            [dispatcher]
            immediate = false
            queue_pool_capacity = 2
            path_pool_capacity = 4
            path_depth_hint = 32
            target_count_hint = 2

            [pool]
            max_pooled_per_type = 0

            [tracking]
            listeners = true

            [logging]
            level = "tributary_core=trace"
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.path_pool_capacity, 4);
        assert_eq!(config.pool.max_pooled_per_type, 0);
        assert!(config.tracking.listeners);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_zero_depth_hint_rejected() {
        let err = EventsConfig::from_toml_str("[dispatcher]\npath_depth_hint = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "dispatcher.path_depth_hint"
        ));
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let err = EventsConfig::from_toml_str("[dispatcher]\nimmediate = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_serialize_round_trip_preserves_values() {
        let mut config = EventsConfig::default();
        config.tracking.listeners = true;
        config.dispatcher.path_depth_hint = 8;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = EventsConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
