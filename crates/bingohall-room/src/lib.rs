//! Room lifecycle, number calling, prizes, and refunds for Bingo Hall.
//!
//! Every room is a row in the [`RoomStore`] guarded by its own lock. All
//! money moves through a [`Wallet`] in atomic batches, and a room changes
//! only after its batch has been applied.
//!
//! # Key types
//!
//! - [`RoomManager`]: create, join, start, call, mark, claim, cancel
//! - [`FailureDetector`]: finds stalled games and refunds them
//! - [`Wallet`]: the balance store money moves through
//! - [`GameRules`] and [`DetectorConfig`]: the tunables
//! - [`RoomError`]: every failure, classified by [`ErrorKind`]

#![allow(async_fn_in_trait)]

mod alert;
mod caller;
mod clock;
mod config;
mod detector;
mod error;
mod manager;
mod model;
mod prize;
mod store;
pub mod wallet;

pub use alert::{Alert, AlertSink, LogAlerts, Severity};
pub use caller::DrawOutcome;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DetectorConfig, GameRules};
pub use detector::{FailureDetector, RecoveryReport, StalledRoom, SweepFailure, SweepReport};
pub use error::{ErrorKind, RoomError, WalletError};
pub use manager::{CancelOutcome, CloseCheck, JoinOutcome, MarkOutcome, RoomManager};
pub use model::{
    Actor, AuditEntry, AuditKind, Card, Draw, GameRoom, PlayerEntry, PlayerStats, RefundRecord,
};
pub use prize::{ClaimOutcome, WinReport, split_pot};
pub use store::{RoomRef, RoomStore, StoreSnapshot};
pub use wallet::{LedgerEntry, MemoryWallet, Wallet, WalletSnapshot};
