//! Error types for the event engine.
//!
//! Handler failures are not represented here: they are captured into the
//! outcome value of the event being dispatched (see [`crate::Failure`]).

use crate::component::ComponentId;
use crate::handler::HandlerId;
use switchboard_config::ConfigError;
use thiserror::Error;

/// Errors returned by manager operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The component is not attached.
    #[error("Component {0} is not attached")]
    ComponentNotFound(ComponentId),

    /// The handler is not registered.
    #[error("Handler {0} is not registered")]
    HandlerNotFound(HandlerId),

    /// `run()` was called while the loop is already running.
    #[error("Manager loop is already running")]
    AlreadyRunning,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, Error>;
