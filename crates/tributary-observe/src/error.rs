use std::path::PathBuf;

/// Errors from reading or writing record files
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
