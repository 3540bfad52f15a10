use crate::connection::ConnectionState;
use thiserror::Error;

/// A message that cannot be applied as sent. The message is dropped, the
/// connection stays up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed payload for {cmd}: {reason}")]
    MalformedPayload { cmd: &'static str, reason: String },
    #[error("invalid group token {0:?}: expected 32 hex characters")]
    InvalidToken(String),
    #[error("columns already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressingError {
    #[error("unknown column {index} ({available} columns available)")]
    UnknownColumn { index: usize, available: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Addressing(#[from] AddressingError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection is {state}, message not applied")]
    NotOpen { state: ConnectionState },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroCapacity { name: &'static str },
    #[error("unknown close policy: {0}")]
    UnknownClosePolicy(String),
}
