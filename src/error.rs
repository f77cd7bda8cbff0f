//! Error type shared by the orchestrator and the worker handle.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaygroundError {
    /// The snippet depends on host-runtime APIs the sandbox does not provide.
    #[error("snippet cannot run in the sandbox: {0}")]
    NodeOnly(String),
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn execution context: {0}")]
    Spawn(String),
    #[error("execution context is no longer accepting requests")]
    Disconnected,
}
