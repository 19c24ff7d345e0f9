//! # Switchboard Configuration
//!
//! Configuration types, loading and logging setup for the switchboard event
//! engine.
//!
//! ## Features
//!
//! - Multi-format support (TOML, JSON, YAML)
//! - `SWITCHBOARD_*` environment overrides
//! - Validation with field-level errors
//! - `tracing` subscriber initialisation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchboard_config::{init_logging, ConfigLoader};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load(Some("switchboard.toml".as_ref()))?;
//!     init_logging(&config.logging)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod loader;
mod logging;

pub use config::*;
pub use error::*;
pub use loader::*;
pub use logging::*;
