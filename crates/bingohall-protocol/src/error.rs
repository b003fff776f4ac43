//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, unknown
    /// command or enum spelling.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room code that does not match the code format.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// A pattern name that is not `line`, `corners`, or `fullcard`.
    #[error("unknown pattern: {0:?}")]
    UnknownPattern(String),

    /// The frame decoded but breaks a protocol rule (e.g. a command
    /// before the handshake).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
