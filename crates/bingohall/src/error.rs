//! Unified error type for the Bingo Hall server.

use bingohall_protocol::{Event, ProtocolError};
use bingohall_room::RoomError;
use bingohall_session::SessionError;
use bingohall_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` variants let `?` lift sub-crate errors. [`HallError::to_event`]
/// turns any of them into the `error` event a client receives.
#[derive(Debug, thiserror::Error)]
pub enum HallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// A command that is well formed but unacceptable to the gateway
    /// (empty chat, chatting in a room the connection does not watch).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HallError {
    /// HTTP-style status code for the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::Room(err) => err.code(),
            Self::Protocol(_) | Self::BadRequest(_) => 400,
            Self::Session(SessionError::AuthFailed(_)) => 401,
            Self::Session(SessionError::NotFound(_)) => 404,
            Self::Transport(_) | Self::Config(_) | Self::Snapshot(_) | Self::Io(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Room(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn to_event(&self) -> Event {
        Event::Error {
            code: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}
