//! Error types for the room engine.
//!
//! Every failure belongs to one [`ErrorKind`]. The kind decides how the
//! gateway reports it: validation and business errors go straight back
//! to the caller, concurrency errors are marked retryable, and system
//! errors are logged and alerted.

use std::fmt;

use bingohall_protocol::{
    Amount, CardId, Currency, PatternType, Position, RoomCode, RoomStatus, UserId,
};

/// The error taxonomy of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Rejected before touching state.
    Validation,
    /// A rule of the game forbids the request right now.
    Business,
    /// Transient contention. Retry after backing off.
    Concurrency,
    /// The request would repeat a terminal transition.
    Consistency,
    NotFound,
    /// Something outside the room failed (wallet, storage).
    System,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Business => "business",
            Self::Concurrency => "concurrency",
            Self::Consistency => "consistency",
            Self::NotFound => "not_found",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Failures from the wallet abstraction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("insufficient {currency} for user {user_id}: need {needed}, have {available}")]
    InsufficientFunds {
        user_id: UserId,
        currency: Currency,
        needed: Amount,
        available: Amount,
    },

    #[error("balance overflow for user {0}")]
    Overflow(UserId),

    /// The backing store could not be reached.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    // -- Validation --------------------------------------------------------
    #[error("invalid room settings: {0}")]
    InvalidSettings(String),

    #[error("card count must be between 1 and {max}, got {requested}")]
    InvalidCardCount { requested: u32, max: u32 },

    #[error("position {0} is not on the card")]
    InvalidPosition(Position),

    #[error("cell {0} does not hold a number")]
    CellNotNumber(Position),

    #[error("card {0} not found in this room")]
    CardNotFound(CardId),

    #[error("card {0} belongs to another player")]
    CardNotOwned(CardId),

    #[error("room plays {required}, not {claimed}")]
    PatternMismatch {
        claimed: PatternType,
        required: PatternType,
    },

    #[error("amount overflow")]
    AmountOverflow,

    // -- Business ----------------------------------------------------------
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("room limit reached: at most {limit} waiting rooms")]
    RoomLimitReached { limit: usize },

    #[error("only the host can do that")]
    NotHost,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot {operation} while room is {status}")]
    InvalidStatus {
        status: RoomStatus,
        operation: &'static str,
    },

    #[error("cannot start a game with no players")]
    NoPlayers,

    #[error("all numbers have been drawn")]
    NumbersExhausted,

    #[error("user {0} is not a player in this room")]
    NotAPlayer(UserId),

    #[error("number {0} has not been drawn")]
    NumberNotDrawn(u8),

    #[error("auto-call requires {required_xp} XP")]
    AutoCallNotAllowed { required_xp: u32 },

    #[error("room cannot be closed: {0}")]
    CloseDenied(String),

    // -- Concurrency -------------------------------------------------------
    #[error("slow down: retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    // -- Consistency -------------------------------------------------------
    #[error("room {0} already finished")]
    AlreadyFinished(RoomCode),

    // -- Not found ---------------------------------------------------------
    #[error("room {0} not found")]
    NotFound(RoomCode),

    // -- System ------------------------------------------------------------
    #[error("wallet error: {0}")]
    Wallet(#[source] WalletError),

    #[error("could not allocate a unique room code")]
    CodeSpaceExhausted,
}

impl From<WalletError> for RoomError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds {
                needed, available, ..
            } => Self::InsufficientBalance { needed, available },
            other => Self::Wallet(other),
        }
    }
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSettings(_)
            | Self::InvalidCardCount { .. }
            | Self::InvalidPosition(_)
            | Self::CellNotNumber(_)
            | Self::CardNotFound(_)
            | Self::CardNotOwned(_)
            | Self::PatternMismatch { .. }
            | Self::AmountOverflow => ErrorKind::Validation,

            Self::RoomFull(_)
            | Self::InsufficientBalance { .. }
            | Self::RoomLimitReached { .. }
            | Self::NotHost
            | Self::Forbidden(_)
            | Self::InvalidStatus { .. }
            | Self::NoPlayers
            | Self::NumbersExhausted
            | Self::NotAPlayer(_)
            | Self::NumberNotDrawn(_)
            | Self::AutoCallNotAllowed { .. }
            | Self::CloseDenied(_) => ErrorKind::Business,

            Self::RateLimited { .. } => ErrorKind::Concurrency,
            Self::AlreadyFinished(_) => ErrorKind::Consistency,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Wallet(_) | Self::CodeSpaceExhausted => ErrorKind::System,
        }
    }

    /// HTTP-style status code for the error event.
    pub fn code(&self) -> u16 {
        match self {
            Self::InsufficientBalance { .. } => 402,
            Self::NotHost | Self::Forbidden(_) | Self::AutoCallNotAllowed { .. } => 403,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::Business | ErrorKind::Consistency => 409,
                ErrorKind::Concurrency => 429,
                ErrorKind::NotFound => 404,
                ErrorKind::System => 500,
            },
        }
    }

    /// Only contention is worth retrying; everything else fails the same
    /// way on a second attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        let code = RoomCode::parse("ABC234").unwrap();
        assert_eq!(RoomError::InvalidCardCount { requested: 0, max: 10 }.code(), 400);
        assert_eq!(
            RoomError::InsufficientBalance {
                needed: Amount(10),
                available: Amount(3)
            }
            .code(),
            402
        );
        assert_eq!(RoomError::NotHost.code(), 403);
        assert_eq!(RoomError::NotFound(code.clone()).code(), 404);
        assert_eq!(RoomError::RoomFull(code.clone()).code(), 409);
        assert_eq!(RoomError::AlreadyFinished(code).code(), 409);
        assert_eq!(RoomError::RateLimited { retry_after_ms: 500 }.code(), 429);
        assert_eq!(RoomError::CodeSpaceExhausted.code(), 500);
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(RoomError::RateLimited { retry_after_ms: 1 }.is_retryable());
        assert!(!RoomError::NumbersExhausted.is_retryable());
        assert!(!RoomError::Wallet(WalletError::Unavailable("down".into())).is_retryable());
    }

    #[test]
    fn test_insufficient_funds_becomes_business_error() {
        let err: RoomError = WalletError::InsufficientFunds {
            user_id: UserId(1),
            currency: Currency::Coins,
            needed: Amount(20),
            available: Amount(5),
        }
        .into();
        assert!(matches!(err, RoomError::InsufficientBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::Business);

        let err: RoomError = WalletError::Overflow(UserId(1)).into();
        assert_eq!(err.kind(), ErrorKind::System);
    }
}
