//! Error types for the session layer.

use bingohall_protocol::UserId;

/// Errors from authentication and session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was invalid, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given user.
    #[error("session not found for user {0}")]
    NotFound(UserId),
}
