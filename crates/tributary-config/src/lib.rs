//! # Tributary Configuration
//!
//! Typed configuration for the tributary event engine, loaded from TOML.
//!
//! ## Features
//!
//! - Dispatcher tuning (immediate mode, pool capacities, path sizing hints)
//! - Per-type event pool limits
//! - Optional listener tracking for debugging tools
//! - `tracing` subscriber setup driven by the same file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tributary_config::{init_tracing, EventsConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EventsConfig::load("tributary.toml")?;
//!     init_tracing(&config.logging)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
pub mod logging;

pub use config::*;
pub use error::ConfigError;
pub use logging::{init_tracing, LogFormat, LoggingConfig};
