use std::path::PathBuf;

/// Errors raised while loading or applying configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config at {}: {source}", path.display())]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field parsed but holds an unusable value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Dotted path of the offending field
        field: String,
        /// Description of the rejected value
        value: String,
    },

    /// The tracing subscriber could not be installed
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
