//! Game rules and failure-detector settings.

use std::time::Duration;

use bingohall_protocol::RoomSettings;
use serde::{Deserialize, Serialize};

use crate::RoomError;

// ---------------------------------------------------------------------------
// GameRules
// ---------------------------------------------------------------------------

/// The tunable rules of the hall.
///
/// One XP threshold governs everything a "power user" unlocks: the larger
/// room limit, auto-call on by default, the right to toggle auto-call, and
/// forced auto-call when the host drops mid-game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Experience at which a host becomes a power user.
    pub power_user_xp: u32,
    /// Concurrent `waiting` rooms a regular host may hold.
    pub room_limit: usize,
    /// Concurrent `waiting` rooms a power user may hold.
    pub power_room_limit: usize,
    /// Most cards one join may buy.
    pub max_cards_per_join: u32,
    /// Upper bound for a room's `max_players` setting.
    pub max_players_limit: u32,
    /// Minimum gap between two manual draws in one room.
    pub manual_call_cooldown_ms: u64,
    /// Gap between server-driven draws.
    pub auto_call_interval_secs: u64,
    /// Percent of the pot paid to the winner.
    pub winner_share_pct: u8,
    /// Percent of the pot paid to the host. The rest is the platform fee.
    pub host_share_pct: u8,
    /// XP granted to the winner.
    pub win_xp: u32,
    /// XP granted to every other participant of a finished game.
    pub play_xp: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            power_user_xp: 500,
            room_limit: 1,
            power_room_limit: 3,
            max_cards_per_join: 10,
            max_players_limit: 100,
            manual_call_cooldown_ms: 1_500,
            auto_call_interval_secs: 5,
            winner_share_pct: 70,
            host_share_pct: 20,
            win_xp: 50,
            play_xp: 10,
        }
    }
}

impl GameRules {
    pub fn is_power_user(&self, experience: u32) -> bool {
        experience >= self.power_user_xp
    }

    /// How many `waiting` rooms a host with `experience` may hold.
    pub fn room_limit_for(&self, experience: u32) -> usize {
        if self.is_power_user(experience) {
            self.power_room_limit
        } else {
            self.room_limit
        }
    }

    pub fn manual_call_cooldown(&self) -> Duration {
        Duration::from_millis(self.manual_call_cooldown_ms)
    }

    pub fn auto_call_interval(&self) -> Duration {
        Duration::from_secs(self.auto_call_interval_secs)
    }

    /// Rejects settings a host may not open a room with.
    pub fn validate_settings(&self, settings: &RoomSettings) -> Result<(), RoomError> {
        if settings.card_cost.is_zero() {
            return Err(RoomError::InvalidSettings("card cost must be positive".into()));
        }
        if settings.max_players == 0 || settings.max_players > self.max_players_limit {
            return Err(RoomError::InvalidSettings(format!(
                "max players must be between 1 and {}",
                self.max_players_limit
            )));
        }
        Ok(())
    }

    /// Checks a join's card count.
    pub fn validate_card_count(&self, card_count: u32) -> Result<(), RoomError> {
        if card_count == 0 || card_count > self.max_cards_per_join {
            return Err(RoomError::InvalidCardCount {
                requested: card_count,
                max: self.max_cards_per_join,
            });
        }
        Ok(())
    }

    /// Clamps the prize shares so they never exceed the whole pot.
    pub fn validated(mut self) -> Self {
        self.winner_share_pct = self.winner_share_pct.min(100);
        if u16::from(self.winner_share_pct) + u16::from(self.host_share_pct) > 100 {
            tracing::warn!(
                winner = self.winner_share_pct,
                host = self.host_share_pct,
                "prize shares exceed 100%, clamping host share"
            );
            self.host_share_pct = 100 - self.winner_share_pct;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// DetectorConfig
// ---------------------------------------------------------------------------

/// Timing for the failure detector and the host-disconnect check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// How often the watchdog sweeps.
    pub sweep_interval_secs: u64,
    /// Idle time after which any in-progress game is stalled.
    pub inactivity_timeout_secs: u64,
    /// Idle time after which a manually called game is stalled.
    pub manual_host_timeout_secs: u64,
    /// Games idle for longer than this are refunded after a restart.
    pub restart_grace_secs: u64,
    /// How long a disconnected non-power host has to come back.
    pub host_disconnect_grace_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5 * 60,
            inactivity_timeout_secs: 15 * 60,
            manual_host_timeout_secs: 10 * 60,
            restart_grace_secs: 5 * 60,
            host_disconnect_grace_secs: 5 * 60,
        }
    }
}

impl DetectorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn manual_host_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_host_timeout_secs)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }

    pub fn host_disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.host_disconnect_grace_secs)
    }
}
