//! Error types for BattlEye RCON

use thiserror::Error;

/// Result type for RCON operations
pub type Result<T> = std::result::Result<T, RconError>;

/// RCON error types
#[derive(Debug, Error)]
pub enum RconError {
    /// Datagram did not match the wire layout
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Operation attempted in the wrong protocol state
    #[error("protocol is {current}, expected {expected}")]
    InvalidState {
        current: &'static str,
        expected: &'static str,
    },

    /// The server denied the password, or login could never complete
    #[error("login failed: {0}")]
    Login(String),

    /// A command exhausted its attempts or was refused by the server
    #[error("command failed: {0}")]
    Command(String),

    /// Server message matched no known pattern
    #[error("unexpected server message: {0}")]
    UnexpectedMessage(String),

    /// OS-level socket failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A wait on an event or response ran out of time
    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<std::io::Error> for RconError {
    fn from(err: std::io::Error) -> Self {
        RconError::Transport(err.to_string())
    }
}
