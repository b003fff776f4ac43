//! Wire protocol and shared game data for Bingo Hall.
//!
//! - **Types** ([`UserId`], [`RoomCode`], [`Amount`], [`GameMode`], ...):
//!   identities, money, and game settings.
//! - **Grid** ([`Grid`], [`Cell`], [`Marks`]): card layout and marks.
//! - **Messages** ([`Envelope`], [`Command`], [`Event`]): what the
//!   client and gateway exchange.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, messages out.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Gateway (Command → Event)
//! ```

mod codec;
mod error;
mod grid;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use grid::{Cell, Grid, Marks, Position};
pub use message::{
    CardView, Command, Envelope, Event, Payload, PlayerView, PrizeSplit, RefundView,
    RoomSettings, RoomSummary, RoomView, StalledRoomReport, SystemMessage,
};
pub use types::{
    ActorKind, Amount, CancelReason, CardId, Currency, GameMode, PatternType, RoomCode, RoomId,
    RoomStatus, StallReason, UserId,
};
