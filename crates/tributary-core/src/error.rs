//! Error types for callback execution and dispatch

use std::error::Error as StdError;

use crate::handler::HandlerId;

/// Failure reported by a callback or default-action hook
///
/// Returning this from a callback aborts the remainder of the propagation
/// path and surfaces from the `dispatch`/`send_event` call that started it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CallbackError {
    /// Create an error with a message only
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Human-readable description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by dispatch entry points
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A callback or default-action hook failed
    #[error("callback failed: {0}")]
    Callback(#[from] CallbackError),

    /// The handler outlived the coordinator that created it
    #[error("coordinator of handler {handler} has been dropped")]
    CoordinatorDropped {
        /// Handler the send was attempted on
        handler: HandlerId,
    },

    /// Re-parenting would make a handler its own ancestor
    #[error("making {parent} the parent of {child} would create a cycle")]
    ParentCycle {
        /// Handler being re-parented
        child: HandlerId,
        /// Rejected parent
        parent: HandlerId,
    },
}

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Result type returned by callbacks and default-action hooks
pub type CallbackResult = std::result::Result<(), CallbackError>;
