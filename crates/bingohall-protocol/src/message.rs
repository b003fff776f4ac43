//! Messages that travel between clients and the gateway.
//!
//! Every frame is an [`Envelope`]. Its [`Payload`] is either a
//! framework-level [`SystemMessage`] (handshake, heartbeat), a client
//! [`Command`], or a server [`Event`].
//!
//! Commands and events are tagged unions: one variant per room
//! operation, dispatched by a single handler on the server. There is no
//! free-form event name anywhere on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ActorKind, Amount, CancelReason, CardId, Currency, GameMode, Grid, PatternType, Position,
    RoomCode, RoomId, RoomStatus, StallReason, UserId,
};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    pub payload: Payload,
}

/// What an envelope carries.
///
/// Adjacently tagged:
/// `{ "type": "Command", "data": { "type": "call_number", "code": "ABC234" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    Command(Command),
    Event(Event),
}

/// Connection plumbing, independent of any room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server: first frame on every connection.
    Handshake { version: u32, token: Option<String> },

    /// Server → Client: the token was accepted.
    HandshakeAck {
        user_id: UserId,
        username: String,
        server_time: u64,
    },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client keep-alive reply, echoing `client_time`.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Either direction: closing the connection.
    Disconnect { reason: String },

    /// Server → Client: connection-level failure (bad handshake, bad frame).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Commands (client → server)
// ---------------------------------------------------------------------------

/// Settings a host chooses when opening a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub mode: GameMode,
    pub pattern: PatternType,
    pub currency: Currency,
    pub card_cost: Amount,
    pub max_players: u32,
}

/// Every room operation a client can request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CreateRoom(RoomSettings),
    /// Buy `card_count` cards and take a seat.
    JoinRoom { code: RoomCode, card_count: u32 },
    /// Subscribe to a room's events without buying in (hosts, spectators,
    /// reconnecting players).
    WatchRoom { code: RoomCode },
    /// Stop receiving a room's events. Does not refund.
    LeaveRoom { code: RoomCode },
    GetRoom { code: RoomCode },
    /// Waiting rooms open for joining.
    ListRooms,
    StartGame { code: RoomCode },
    CallNumber { code: RoomCode },
    MarkNumber {
        code: RoomCode,
        card_id: CardId,
        position: Position,
    },
    ClaimBingo {
        code: RoomCode,
        card_id: CardId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<PatternType>,
    },
    SetAutoCall { code: RoomCode, enabled: bool },
    SetReady { code: RoomCode, ready: bool },
    Chat { code: RoomCode, text: String },
    CloseRoom { code: RoomCode },
    /// Admin: the failure report.
    StalledRooms,
    /// Admin: cancel and refund a room regardless of its state.
    ForceRefund { code: RoomCode },
}

impl Command {
    /// The room this command targets, if any.
    pub fn room_code(&self) -> Option<&RoomCode> {
        match self {
            Self::CreateRoom(_) | Self::ListRooms | Self::StalledRooms => None,
            Self::JoinRoom { code, .. }
            | Self::WatchRoom { code }
            | Self::LeaveRoom { code }
            | Self::GetRoom { code }
            | Self::StartGame { code }
            | Self::CallNumber { code }
            | Self::MarkNumber { code, .. }
            | Self::ClaimBingo { code, .. }
            | Self::SetAutoCall { code, .. }
            | Self::SetReady { code, .. }
            | Self::Chat { code, .. }
            | Self::CloseRoom { code }
            | Self::ForceRefund { code } => Some(code),
        }
    }
}

// ---------------------------------------------------------------------------
// Views (snapshots sent to clients)
// ---------------------------------------------------------------------------

/// A player's seat in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: UserId,
    pub username: String,
    pub cards_purchased: u32,
    pub total_spent: Amount,
    pub is_connected: bool,
    pub is_ready: bool,
    pub winnings: Amount,
}

/// A purchased card and its marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub id: CardId,
    pub owner: UserId,
    pub grid: Grid,
    pub marked: Vec<Position>,
}

/// Full room state, as broadcast in `room_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: RoomId,
    pub code: RoomCode,
    pub host_id: UserId,
    pub mode: GameMode,
    pub pattern: PatternType,
    pub currency: Currency,
    pub card_cost: Amount,
    pub max_players: u32,
    pub total_pot: Amount,
    pub status: RoomStatus,
    pub auto_call: bool,
    pub is_stalled: bool,
    pub winner_id: Option<UserId>,
    pub players: Vec<PlayerView>,
    /// Drawn numbers in draw order.
    pub drawn: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

/// One line of the room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub host_id: UserId,
    pub mode: GameMode,
    pub pattern: PatternType,
    pub currency: Currency,
    pub card_cost: Amount,
    pub player_count: u32,
    pub max_players: u32,
    pub total_pot: Amount,
    pub auto_call: bool,
}

/// How a pot was divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSplit {
    pub winner_prize: Amount,
    pub host_prize: Amount,
    /// Retained by the platform; not credited to any wallet.
    pub platform_fee: Amount,
}

impl PrizeSplit {
    /// Sum of all three parts (equals the pot it was computed from).
    pub fn total(&self) -> Amount {
        Amount(self.winner_prize.0 + self.host_prize.0 + self.platform_fee.0)
    }
}

/// One player's refund in a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundView {
    pub user_id: UserId,
    pub amount: Amount,
}

/// A row of the admin failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledRoomReport {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub reason: StallReason,
    pub status: RoomStatus,
    pub last_activity_at: DateTime<Utc>,
    pub refunded: Amount,
}

// ---------------------------------------------------------------------------
// Events (server → client)
// ---------------------------------------------------------------------------

/// Everything the server tells clients.
///
/// Broadcast events go to every connection subscribed to the room; reply
/// events go only to the connection whose command produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Reply to `create_room`.
    RoomCreated { room: RoomView },
    /// Reply to `join_room`; `already_joined` when the seat existed.
    Joined {
        room: RoomView,
        cards: Vec<CardView>,
        already_joined: bool,
    },
    RoomState { room: RoomView },
    RoomList { rooms: Vec<RoomSummary> },
    /// Reply to `leave_room`.
    Left { code: RoomCode },
    NumberCalled {
        code: RoomCode,
        number: u8,
        draw_order: u32,
        remaining: u32,
        is_auto: bool,
    },
    NumberMarked {
        code: RoomCode,
        user_id: UserId,
        card_id: CardId,
        position: Position,
        number: u8,
    },
    /// Reply to `claim_bingo` that did not win.
    ClaimRejected {
        code: RoomCode,
        card_id: CardId,
        pattern: PatternType,
    },
    GameOver {
        code: RoomCode,
        winner_id: UserId,
        card_id: CardId,
        pattern: PatternType,
        split: PrizeSplit,
    },
    RoomCancelled {
        code: RoomCode,
        reason: CancelReason,
        actor: ActorKind,
        refunds: Vec<RefundView>,
    },
    /// Reply to a close on a room that was already terminal.
    AlreadyClosed { code: RoomCode, status: RoomStatus },
    AutoCallEnabled { code: RoomCode },
    AutoCallDisabled { code: RoomCode },
    /// Auto-call turned on by the server because the host dropped.
    AutoCallForced { code: RoomCode, reason: String },
    Chat {
        code: RoomCode,
        user_id: UserId,
        username: String,
        text: String,
        sent_at: DateTime<Utc>,
    },
    StalledRooms { rooms: Vec<StalledRoomReport> },
    Error {
        code: u16,
        message: String,
        retryable: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::parse("ABC234").unwrap()
    }

    #[test]
    fn test_command_wire_format() {
        let json = r#"{"type":"claim_bingo","code":"abc234","card_id":7,"pattern":"line"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            Command::ClaimBingo {
                code: code(),
                card_id: CardId(7),
                pattern: Some(PatternType::Line),
            }
        );
        assert_eq!(cmd.room_code(), Some(&code()));
    }

    #[test]
    fn test_create_room_settings_inline_with_tag() {
        let json = r#"{"type":"create_room","mode":"75","pattern":"corners","currency":"coins","card_cost":10,"max_players":8}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        let Command::CreateRoom(settings) = cmd else {
            panic!("expected create_room");
        };
        assert_eq!(settings.mode, GameMode::Seventy5);
        assert_eq!(settings.pattern, PatternType::Corners);
        assert_eq!(settings.card_cost, Amount(10));
    }

    #[test]
    fn test_unknown_pattern_is_rejected_at_decode() {
        let json = r#"{"type":"claim_bingo","code":"ABC234","card_id":1,"pattern":"x"}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }

    #[test]
    fn test_event_uses_snake_case_tags() {
        let evt = Event::NumberCalled {
            code: code(),
            number: 42,
            draw_order: 3,
            remaining: 72,
            is_auto: true,
        };
        let value = serde_json::to_value(&evt).unwrap();
        assert_eq!(value["type"], "number_called");
        assert_eq!(value["code"], "ABC234");
        assert_eq!(value["number"], 42);
    }

    #[test]
    fn test_prize_split_total() {
        let split = PrizeSplit {
            winner_prize: Amount(14),
            host_prize: Amount(4),
            platform_fee: Amount(2),
        };
        assert_eq!(split.total(), Amount(20));
    }
}
