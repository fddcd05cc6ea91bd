//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("store error: {0}")]
    Store(String),

    /// A chat exchange is already in flight for the session.
    #[error("busy: {0}")]
    Busy(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is valid but the session is not in the right state
    /// (e.g. program generation before the intake is complete).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
