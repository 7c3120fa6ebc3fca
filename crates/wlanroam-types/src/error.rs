//! Error types shared across the engine boundary.

use thiserror::Error;

use crate::command::InterfaceId;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced synchronously at the engine facade. Asynchronous
/// outcomes are delivered as `CommandStatus` through the completion
/// callback instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Command pool exhausted; the caller may retry later
    #[error("no command resources available")]
    NoResources,

    /// The interface id is not registered with the engine
    #[error("no such interface: {0}")]
    NoSuchInterface(InterfaceId),

    /// The interface id is already registered
    #[error("interface already exists: {0}")]
    InterfaceExists(InterfaceId),

    /// The interface arena is at capacity
    #[error("interface table full (max {0})")]
    TooManyInterfaces(usize),

    /// The operation does not apply in the session's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed MAC address input
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

/// Failure from the external frame codec while parsing a candidate's IE
/// body. Total failure of a single candidate only disqualifies that
/// candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    #[error("IE body truncated at offset {0}")]
    Truncated(usize),

    #[error("malformed information element: {0}")]
    Malformed(String),

    #[error("unsupported security configuration: {0}")]
    UnsupportedSecurity(String),
}
