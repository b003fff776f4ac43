//! # Bingo Hall
//!
//! Realtime server for multiplayer, real-money Bingo.
//!
//! Clients connect over WebSocket, authenticate with a token, and send
//! [`Command`](bingohall_protocol::Command)s. The [`Gateway`] runs each one
//! against the room engine and fans the resulting
//! [`Event`](bingohall_protocol::Event)s out to every connection watching
//! the room. A [`Watchdog`] sweeps for stalled games in the background and
//! refunds them.
//!
//! ```text
//! Transport → Protocol → Session → Gateway → RoomManager → Wallet
//!                                      ↘ AutoCallers, RoomChannels
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bingohall::prelude::*;
//!
//! # async fn run(auth: impl Authenticator) -> Result<(), HallError> {
//! let server = HallServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(auth, Arc::new(MemoryWallet::new()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod autocall;
mod channels;
mod config;
mod error;
mod gateway;
mod handler;
mod server;
mod snapshot;
mod watchdog;

pub use autocall::AutoCallers;
pub use channels::{EventSender, RoomChannels, Subscriber};
pub use config::HallConfig;
pub use error::HallError;
pub use gateway::{Gateway, MAX_CHAT_CHARS};
pub use server::{HallServer, HallServerBuilder, PROTOCOL_VERSION};
pub use snapshot::HallSnapshot;
pub use watchdog::Watchdog;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{
        Gateway, HallConfig, HallError, HallServer, HallServerBuilder, HallSnapshot,
        PROTOCOL_VERSION, Subscriber, Watchdog,
    };
    pub use bingohall_protocol::{
        ActorKind, Amount, CancelReason, Codec, Command, Currency, Envelope, Event, GameMode,
        JsonCodec, PatternType, Payload, RoomCode, RoomSettings, RoomStatus, SystemMessage, UserId,
    };
    pub use bingohall_room::{
        DetectorConfig, GameRules, ManualClock, MemoryWallet, RoomManager, RoomStore,
        SystemClock, Wallet,
    };
    pub use bingohall_session::{ADMIN_ROLE, Authenticator, SessionError, UserContext};
}
