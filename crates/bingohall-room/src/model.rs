//! The room aggregate and the records written alongside it.

use bingohall_protocol::{
    ActorKind, Amount, CancelReason, CardId, CardView, Currency, GameMode, Grid, Marks,
    PatternType, PlayerView, PrizeSplit, RoomCode, RoomId, RoomSettings, RoomStatus, RoomSummary,
    RoomView, StallReason, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Who asked for a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    /// `None` for the system.
    pub id: Option<UserId>,
}

impl Actor {
    pub fn host(id: UserId) -> Self {
        Self {
            kind: ActorKind::Host,
            id: Some(id),
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            kind: ActorKind::Admin,
            id: Some(id),
        }
    }

    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Room parts
// ---------------------------------------------------------------------------

/// A user's seat in a room. Never removed while the room exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub user_id: UserId,
    pub username: String,
    pub cards_purchased: u32,
    pub total_spent: Amount,
    pub is_connected: bool,
    pub is_ready: bool,
    pub winnings: Amount,
    pub joined_at: DateTime<Utc>,
}

impl PlayerEntry {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            user_id: self.user_id,
            username: self.username.clone(),
            cards_purchased: self.cards_purchased,
            total_spent: self.total_spent,
            is_connected: self.is_connected,
            is_ready: self.is_ready,
            winnings: self.winnings,
        }
    }
}

/// A purchased card: an immutable grid plus its marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub owner: UserId,
    pub grid: Grid,
    pub marks: Marks,
}

impl Card {
    pub fn view(&self) -> CardView {
        CardView {
            id: self.id,
            owner: self.owner,
            grid: self.grid.clone(),
            marked: self.marks.positions(),
        }
    }
}

/// One entry of the append-only draw history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub number: u8,
    /// 1-based and strictly increasing.
    pub draw_order: u32,
    pub called_at: DateTime<Utc>,
    pub is_auto: bool,
}

// ---------------------------------------------------------------------------
// GameRoom
// ---------------------------------------------------------------------------

/// Everything about one room, locked as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRoom {
    pub id: RoomId,
    pub code: RoomCode,
    pub host_id: UserId,
    pub mode: GameMode,
    pub pattern: PatternType,
    pub currency: Currency,
    pub card_cost: Amount,
    pub max_players: u32,
    /// Equals the sum of `total_spent` while the room is not terminal.
    pub total_pot: Amount,
    pub status: RoomStatus,
    pub auto_call: bool,
    pub is_stalled: bool,
    pub stall_reason: Option<StallReason>,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    /// Time of the latest draw; the creation time until the first one.
    pub last_called_at: DateTime<Utc>,
    pub players: Vec<PlayerEntry>,
    pub cards: Vec<Card>,
    pub draws: Vec<Draw>,
}

impl GameRoom {
    pub fn new(
        id: RoomId,
        code: RoomCode,
        host_id: UserId,
        settings: &RoomSettings,
        auto_call: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            host_id,
            mode: settings.mode,
            pattern: settings.pattern,
            currency: settings.currency,
            card_cost: settings.card_cost,
            max_players: settings.max_players,
            total_pot: Amount::ZERO,
            status: RoomStatus::Waiting,
            auto_call,
            is_stalled: false,
            stall_reason: None,
            winner_id: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            last_activity_at: now,
            last_called_at: now,
            players: Vec::new(),
            cards: Vec::new(),
            draws: Vec::new(),
        }
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }

    pub fn player(&self, user_id: UserId) -> Option<&PlayerEntry> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn player_mut(&mut self, user_id: UserId) -> Option<&mut PlayerEntry> {
        self.players.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn card_mut(&mut self, card_id: CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|c| c.id == card_id)
    }

    pub fn cards_of(&self, user_id: UserId) -> Vec<CardView> {
        self.cards
            .iter()
            .filter(|c| c.owner == user_id)
            .map(Card::view)
            .collect()
    }

    pub fn is_drawn(&self, number: u8) -> bool {
        self.draws.iter().any(|d| d.number == number)
    }

    pub fn drawn_numbers(&self) -> Vec<u8> {
        self.draws.iter().map(|d| d.number).collect()
    }

    /// Numbers still in the bag.
    pub fn remaining(&self) -> u32 {
        u32::from(self.mode.max_number()).saturating_sub(self.draws.len() as u32)
    }

    /// Sum of every player's spend.
    pub fn total_spent(&self) -> Amount {
        self.players.iter().map(|p| p.total_spent).sum()
    }

    /// Players other than the host who have paid in.
    pub fn has_other_paying_players(&self) -> bool {
        self.players
            .iter()
            .any(|p| p.user_id != self.host_id && !p.total_spent.is_zero())
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id,
            code: self.code.clone(),
            host_id: self.host_id,
            mode: self.mode,
            pattern: self.pattern,
            currency: self.currency,
            card_cost: self.card_cost,
            max_players: self.max_players,
            total_pot: self.total_pot,
            status: self.status,
            auto_call: self.auto_call,
            is_stalled: self.is_stalled,
            winner_id: self.winner_id,
            players: self.players.iter().map(PlayerEntry::view).collect(),
            drawn: self.drawn_numbers(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            last_activity_at: self.last_activity_at,
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            code: self.code.clone(),
            host_id: self.host_id,
            mode: self.mode,
            pattern: self.pattern,
            currency: self.currency,
            card_cost: self.card_cost,
            player_count: self.players.len() as u32,
            max_players: self.max_players,
            total_pot: self.total_pot,
            auto_call: self.auto_call,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One refunded player in one cancellation. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: u64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub amount: Amount,
    pub currency: Currency,
    pub reason: CancelReason,
    pub actor: ActorKind,
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditKind {
    PrizeDistributed {
        winner_id: UserId,
        host_id: UserId,
        card_id: CardId,
        pot: Amount,
        split: PrizeSplit,
    },
    RoomCancelled {
        reason: CancelReason,
        actor: ActorKind,
        actor_id: Option<UserId>,
        total_refunded: Amount,
    },
    RoomStalled {
        reason: StallReason,
    },
    AutoCallChanged {
        enabled: bool,
        forced: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
}

/// Engine-side progress counters for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub user_id: UserId,
    pub experience: u32,
    pub games_played: u32,
    pub games_won: u32,
    pub total_winnings: Amount,
}

impl PlayerStats {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            experience: 0,
            games_played: 0,
            games_won: 0,
            total_winnings: Amount::ZERO,
        }
    }
}
