use thiserror::Error;

use crate::types::{Direction, MediaKind};

#[derive(Error, Debug)]
pub enum WiringError {
    #[error("Port allocation failed: {request}")]
    PortAllocation { request: String },

    #[error("Structural error: {reason}")]
    Structural { reason: String },

    #[error("Failed to build {direction} chain for {kind}: {reason}")]
    ChainBuild {
        direction: Direction,
        kind: MediaKind,
        reason: String,
    },
}

impl WiringError {
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::Structural { reason: reason.into() }
    }
}

/// Why a multiplexer port name could not be mapped to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not a media port this engine wires. Not an error condition for callers.
    #[error("Port '{name}' has no recognized prefix")]
    UnknownPrefix { name: String },

    #[error("Port '{name}' has a malformed session identifier")]
    MalformedSession { name: String },

    #[error("Port '{name}' refers to unknown session {id}")]
    UnknownSession { name: String, id: u64 },
}

/// Structured startup result; `Ok(..)` is the ready state.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Port allocation failure: {request}")]
    PortAllocationFailure { request: String },

    #[error("Structural error during startup: {reason}")]
    StructuralError { reason: String },
}

impl From<WiringError> for StartupError {
    fn from(err: WiringError) -> Self {
        match err {
            WiringError::PortAllocation { request } => Self::PortAllocationFailure { request },
            other => Self::StructuralError { reason: other.to_string() },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration invalid: {reason}")]
    Invalid { reason: String },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
