//! Room manager: creates rooms, seats players, and closes rooms.
//!
//! This is the entry point for every room operation from the gateway.
//! Number calling lives in [`caller`](crate::caller) and payouts in
//! [`prize`](crate::prize); both extend the same [`RoomManager`].
//!
//! # Transaction shape
//!
//! Each operation follows the same steps:
//!
//! 1. validate the request (no lock needed),
//! 2. take the room's row lock,
//! 3. check the room's status and rules,
//! 4. call the wallet (the only step that can fail after the checks),
//! 5. mutate the room, which cannot fail.
//!
//! If the wallet refuses, the room has not been touched yet, so a player
//! is never debited without receiving cards and never refunded without
//! the room becoming terminal.

use std::sync::{Arc, PoisonError};

use bingohall_card::{generate, initial_marks};
use bingohall_protocol::{
    Amount, CancelReason, CardId, CardView, Cell, Position, RefundView, RoomCode, RoomId,
    RoomSettings, RoomStatus, RoomSummary, RoomView, UserId,
};
use bingohall_session::UserContext;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use crate::wallet::{Memo, Posting};
use crate::{
    Actor, AuditEntry, AuditKind, Card, Clock, GameRoom, GameRules, PlayerEntry, PlayerStats,
    RefundRecord, RoomError, RoomRef, RoomStore, SystemClock, Wallet,
};

/// Attempts at finding an unused room code before giving up.
const MAX_CODE_ATTEMPTS: usize = 32;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room: RoomView,
    pub cards: Vec<CardView>,
    /// The user already had a seat; nothing was charged.
    pub already_joined: bool,
}

/// Answer to "may this actor close this room?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCheck {
    Allowed,
    Denied { reason: String },
    AlreadyClosed { status: RoomStatus },
}

/// Result of a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled {
        code: RoomCode,
        reason: CancelReason,
        refunds: Vec<RefundView>,
        total_refunded: Amount,
    },
    /// The room was already terminal. Nothing happened.
    AlreadyClosed { code: RoomCode, status: RoomStatus },
}

impl CancelOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result of marking a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    pub card_id: CardId,
    pub position: Position,
    pub number: u8,
    /// `false` when the cell was already marked.
    pub fresh: bool,
}

// ---------------------------------------------------------------------------
// RoomManager
// ---------------------------------------------------------------------------

/// Owns the room store and applies every room operation.
pub struct RoomManager<W: Wallet> {
    store: Arc<RoomStore>,
    wallet: Arc<W>,
    rules: GameRules,
    clock: Arc<dyn Clock>,
    rng: std::sync::Mutex<StdRng>,
    /// Serializes room creation so two concurrent creates cannot both
    /// slip under the room limit.
    create_lock: tokio::sync::Mutex<()>,
}

impl<W: Wallet> RoomManager<W> {
    /// A manager with default rules, the system clock, and an empty store.
    pub fn new(wallet: Arc<W>) -> Self {
        Self {
            store: Arc::new(RoomStore::new()),
            wallet,
            rules: GameRules::default(),
            clock: Arc::new(SystemClock),
            rng: std::sync::Mutex::new(StdRng::seed_from_u64(rand::random())),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules.validated();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<RoomStore>) -> Self {
        self.store = store;
        self
    }

    /// Fixes the random source, for reproducible tests.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: std::sync::Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    pub(crate) async fn room(&self, code: &RoomCode) -> Result<RoomRef, RoomError> {
        self.store
            .get(code)
            .await
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    // -- Create ------------------------------------------------------------

    /// Opens a room hosted by `host`.
    ///
    /// # Errors
    /// - [`RoomError::InvalidSettings`] for a zero card cost or an
    ///   out-of-range player limit
    /// - [`RoomError::RoomLimitReached`] if the host already has as many
    ///   `waiting` rooms as their XP allows
    pub async fn create_room(
        &self,
        host: &UserContext,
        settings: RoomSettings,
    ) -> Result<RoomView, RoomError> {
        self.rules.validate_settings(&settings)?;

        let _serial = self.create_lock.lock().await;

        let limit = self.rules.room_limit_for(host.experience);
        let active = self.waiting_rooms_hosted_by(host.id).await;
        if active >= limit {
            debug!(host_id = %host.id, active, limit, "room limit reached");
            return Err(RoomError::RoomLimitReached { limit });
        }

        let auto_call = self.rules.is_power_user(host.experience);
        let now = self.clock.now();
        let id = self.store.next_room_id();

        for _ in 0..MAX_CODE_ATTEMPTS {
            let Some(code) = self.with_rng(random_code) else {
                continue;
            };
            let room = GameRoom::new(id, code, host.id, &settings, auto_call, now);
            let view = room.view();
            if self.store.insert(room).await {
                info!(
                    room_code = %view.code,
                    host_id = %host.id,
                    mode = %settings.mode,
                    pattern = %settings.pattern,
                    card_cost = %settings.card_cost,
                    auto_call,
                    "room created"
                );
                return Ok(view);
            }
        }

        error!(host_id = %host.id, "no free room code after {MAX_CODE_ATTEMPTS} attempts");
        Err(RoomError::CodeSpaceExhausted)
    }

    async fn waiting_rooms_hosted_by(&self, host_id: UserId) -> usize {
        let mut count = 0;
        for room in self.store.all().await {
            let room = room.lock().await;
            if room.host_id == host_id && room.status == RoomStatus::Waiting {
                count += 1;
            }
        }
        count
    }

    // -- Join --------------------------------------------------------------

    /// Buys `card_count` cards in a waiting room.
    ///
    /// A user who already has a seat gets it back unchanged, whatever the
    /// room's status, with `already_joined` set and no charge.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        user: &UserContext,
        card_count: u32,
    ) -> Result<JoinOutcome, RoomError> {
        self.rules.validate_card_count(card_count)?;

        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.player(user.id).is_some() {
            debug!(room_code = %code, user_id = %user.id, "join repeated, returning existing seat");
            return Ok(JoinOutcome {
                room: room.view(),
                cards: room.cards_of(user.id),
                already_joined: true,
            });
        }

        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "join",
            });
        }
        if room.is_full() {
            return Err(RoomError::RoomFull(code.clone()));
        }

        let cost = room
            .card_cost
            .checked_mul(card_count)
            .ok_or(RoomError::AmountOverflow)?;
        let new_pot = room
            .total_pot
            .checked_add(cost)
            .ok_or(RoomError::AmountOverflow)?;

        let available = self.wallet.balance(user.id, room.currency).await?;
        if available < cost {
            return Err(RoomError::InsufficientBalance {
                needed: cost,
                available,
            });
        }

        self.wallet
            .apply(vec![
                Posting::debit(user.id, room.currency, cost, Memo::CardPurchase).for_room(room.id),
            ])
            .await?;

        // Money has moved; from here on nothing may fail.
        let now = self.clock.now();
        let mode = room.mode;
        let grids = self.with_rng(|rng| {
            (0..card_count)
                .map(|_| generate(mode, rng))
                .collect::<Vec<_>>()
        });
        let cards: Vec<Card> = grids
            .into_iter()
            .map(|grid| Card {
                id: self.store.next_card_id(),
                owner: user.id,
                marks: initial_marks(&grid),
                grid,
            })
            .collect();
        let card_views = cards.iter().map(Card::view).collect();

        room.players.push(PlayerEntry {
            user_id: user.id,
            username: user.username.clone(),
            cards_purchased: card_count,
            total_spent: cost,
            is_connected: true,
            is_ready: false,
            winnings: Amount::ZERO,
            joined_at: now,
        });
        room.cards.extend(cards);
        room.total_pot = new_pot;
        room.touch(now);

        info!(
            room_code = %code,
            user_id = %user.id,
            cards = card_count,
            debited = %cost,
            currency = %room.currency,
            pot = %room.total_pot,
            "player joined"
        );

        Ok(JoinOutcome {
            room: room.view(),
            cards: card_views,
            already_joined: false,
        })
    }

    // -- Start -------------------------------------------------------------

    pub async fn start_game(&self, code: &RoomCode, host_id: UserId) -> Result<RoomView, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if !room.is_host(host_id) {
            return Err(RoomError::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "start",
            });
        }
        if room.players.is_empty() {
            return Err(RoomError::NoPlayers);
        }

        let now = self.clock.now();
        room.status = RoomStatus::InProgress;
        room.started_at = Some(now);
        room.last_called_at = now;
        room.touch(now);

        info!(room_code = %code, players = room.players.len(), pot = %room.total_pot, "game started");
        Ok(room.view())
    }

    // -- Close / cancel ----------------------------------------------------

    /// Whether `actor` may close `code` right now.
    pub async fn can_close_room(&self, code: &RoomCode, actor: Actor) -> Result<CloseCheck, RoomError> {
        let room_ref = self.room(code).await?;
        let room = room_ref.lock().await;
        if room.status.is_terminal() {
            return Ok(CloseCheck::AlreadyClosed {
                status: room.status,
            });
        }
        Ok(match check_close(&room, actor) {
            Ok(()) => CloseCheck::Allowed,
            Err(err) => CloseCheck::Denied {
                reason: err.to_string(),
            },
        })
    }

    /// Cancels a room and refunds every player their spend.
    ///
    /// Hosts may only close a waiting room nobody else has paid into.
    /// Admins and the system may close any waiting or in-progress room.
    /// A room that is already finished or cancelled yields
    /// [`CancelOutcome::AlreadyClosed`] with no effects.
    pub async fn cancel_room(
        &self,
        code: &RoomCode,
        actor: Actor,
        reason: CancelReason,
    ) -> Result<CancelOutcome, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.status.is_terminal() {
            debug!(room_code = %code, status = %room.status, "cancel on closed room is a no-op");
            return Ok(CancelOutcome::AlreadyClosed {
                code: code.clone(),
                status: room.status,
            });
        }
        check_close(&room, actor)?;

        let now = self.clock.now();
        self.cancel_locked(&mut room, actor, reason, now).await
    }

    /// Refunds and cancels a room whose lock the caller already holds.
    pub(crate) async fn cancel_locked(
        &self,
        room: &mut GameRoom,
        actor: Actor,
        reason: CancelReason,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, RoomError> {
        if room.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyClosed {
                code: room.code.clone(),
                status: room.status,
            });
        }

        let refunds: Vec<RefundView> = room
            .players
            .iter()
            .filter(|p| !p.total_spent.is_zero())
            .map(|p| RefundView {
                user_id: p.user_id,
                amount: p.total_spent,
            })
            .collect();

        if !refunds.is_empty() {
            let postings = refunds
                .iter()
                .map(|r| {
                    Posting::credit(r.user_id, room.currency, r.amount, Memo::Refund)
                        .for_room(room.id)
                })
                .collect();
            if let Err(err) = self.wallet.apply(postings).await {
                error!(room_code = %room.code, error = %err, "refund batch failed, room left untouched");
                return Err(err.into());
            }
        }

        let total_refunded: Amount = refunds.iter().map(|r| r.amount).sum();
        let records = refunds
            .iter()
            .map(|r| RefundRecord {
                id: self.store.next_refund_id(),
                room_id: room.id,
                user_id: r.user_id,
                amount: r.amount,
                currency: room.currency,
                reason,
                actor: actor.kind,
                actor_id: actor.id,
                created_at: now,
            })
            .collect();

        room.total_pot = Amount::ZERO;
        room.status = RoomStatus::Cancelled;
        room.finished_at = Some(now);
        room.touch(now);

        self.store.record_refunds(records).await;
        self.store
            .append_audit(AuditEntry {
                room_id: room.id,
                code: room.code.clone(),
                at: now,
                kind: AuditKind::RoomCancelled {
                    reason,
                    actor: actor.kind,
                    actor_id: actor.id,
                    total_refunded,
                },
            })
            .await;

        info!(
            room_code = %room.code,
            %reason,
            actor = %actor.kind,
            refunded = %total_refunded,
            players = refunds.len(),
            "room cancelled and refunded"
        );

        Ok(CancelOutcome::Cancelled {
            code: room.code.clone(),
            reason,
            refunds,
            total_refunded,
        })
    }

    // -- Auto-call ---------------------------------------------------------

    /// Host toggles auto-call. Enabling needs power-user XP.
    pub async fn set_auto_call(
        &self,
        code: &RoomCode,
        user: &UserContext,
        enabled: bool,
    ) -> Result<RoomView, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if !room.is_host(user.id) {
            return Err(RoomError::NotHost);
        }
        if room.status.is_terminal() {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "change auto-call",
            });
        }
        if enabled && !self.rules.is_power_user(user.experience) {
            return Err(RoomError::AutoCallNotAllowed {
                required_xp: self.rules.power_user_xp,
            });
        }

        let now = self.clock.now();
        if room.auto_call != enabled {
            room.auto_call = enabled;
            self.store
                .append_audit(AuditEntry {
                    room_id: room.id,
                    code: code.clone(),
                    at: now,
                    kind: AuditKind::AutoCallChanged {
                        enabled,
                        forced: false,
                    },
                })
                .await;
            info!(room_code = %code, enabled, "auto-call changed by host");
        }
        room.touch(now);
        Ok(room.view())
    }

    /// Turns auto-call on for an in-progress room on the system's behalf.
    /// Returns `false` if it was already on.
    pub async fn force_auto_call(&self, code: &RoomCode) -> Result<bool, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.status != RoomStatus::InProgress {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "force auto-call",
            });
        }
        if room.auto_call {
            return Ok(false);
        }

        room.auto_call = true;
        self.store
            .append_audit(AuditEntry {
                room_id: room.id,
                code: code.clone(),
                at: self.clock.now(),
                kind: AuditKind::AutoCallChanged {
                    enabled: true,
                    forced: true,
                },
            })
            .await;
        info!(room_code = %code, "auto-call forced on");
        Ok(true)
    }

    // -- Presence ----------------------------------------------------------

    /// Updates a player's connection flag. Returns `false` if the user has
    /// no seat in the room.
    pub async fn set_connected(
        &self,
        code: &RoomCode,
        user_id: UserId,
        connected: bool,
    ) -> Result<bool, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;
        match room.player_mut(user_id) {
            Some(player) => {
                player.is_connected = connected;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn set_ready(
        &self,
        code: &RoomCode,
        user_id: UserId,
        ready: bool,
    ) -> Result<RoomView, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.status.is_terminal() {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "change ready state",
            });
        }
        let player = room
            .player_mut(user_id)
            .ok_or(RoomError::NotAPlayer(user_id))?;
        player.is_ready = ready;
        Ok(room.view())
    }

    /// The deferred check after a host disconnect.
    ///
    /// Cancels the room with reason `host_disconnected` when the host is
    /// still away, the game is in progress, and nothing is calling
    /// numbers. Returns `None` when no action was needed.
    pub async fn host_disconnect_check(
        &self,
        code: &RoomCode,
        host_still_connected: bool,
    ) -> Result<Option<CancelOutcome>, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if host_still_connected || room.status != RoomStatus::InProgress || room.auto_call {
            debug!(room_code = %code, host_still_connected, status = %room.status, "host check: nothing to do");
            return Ok(None);
        }

        info!(room_code = %code, host_id = %room.host_id, "host did not return, cancelling");
        let now = self.clock.now();
        self.cancel_locked(&mut room, Actor::system(), CancelReason::HostDisconnected, now)
            .await
            .map(Some)
    }

    // -- Marking -----------------------------------------------------------

    /// Marks a drawn number on one of the caller's cards.
    pub async fn mark_number(
        &self,
        code: &RoomCode,
        user_id: UserId,
        card_id: CardId,
        position: Position,
    ) -> Result<MarkOutcome, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        let card = room.card(card_id).ok_or(RoomError::CardNotFound(card_id))?;
        if card.owner != user_id {
            return Err(RoomError::CardNotOwned(card_id));
        }
        if !card.grid.contains(position) {
            return Err(RoomError::InvalidPosition(position));
        }
        let cell = card.grid.cell(position);

        if room.status != RoomStatus::InProgress {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "mark",
            });
        }
        let Some(Cell::Number(number)) = cell else {
            return Err(RoomError::CellNotNumber(position));
        };
        if !room.is_drawn(number) {
            return Err(RoomError::NumberNotDrawn(number));
        }

        let now = self.clock.now();
        let fresh = room
            .card_mut(card_id)
            .is_some_and(|card| card.marks.mark(position));
        if fresh {
            room.touch(now);
        }
        debug!(room_code = %code, %user_id, %card_id, %position, number, fresh, "number marked");

        Ok(MarkOutcome {
            card_id,
            position,
            number,
            fresh,
        })
    }

    // -- Queries -----------------------------------------------------------

    pub async fn room_details(&self, code: &RoomCode) -> Result<RoomView, RoomError> {
        let room_ref = self.room(code).await?;
        let room = room_ref.lock().await;
        Ok(room.view())
    }

    /// The cards `user_id` holds in `code`.
    pub async fn cards_of(&self, code: &RoomCode, user_id: UserId) -> Result<Vec<CardView>, RoomError> {
        let room_ref = self.room(code).await?;
        let room = room_ref.lock().await;
        Ok(room.cards_of(user_id))
    }

    /// Waiting rooms open for joining, oldest first.
    pub async fn list_waiting_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms = Vec::new();
        for room in self.store.all().await {
            let room = room.lock().await;
            if room.status.is_joinable() && !room.is_full() {
                rooms.push(room.summary());
            }
        }
        rooms
    }

    pub async fn refunds_for(&self, room_id: RoomId) -> Vec<RefundRecord> {
        self.store.refunds_for(room_id).await
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.store.audit_log().await
    }

    pub async fn player_stats(&self, user_id: UserId) -> PlayerStats {
        self.store.stats(user_id).await
    }
}

/// The close rules, for a room that is not yet terminal.
fn check_close(room: &GameRoom, actor: Actor) -> Result<(), RoomError> {
    use bingohall_protocol::ActorKind;

    match actor.kind {
        ActorKind::Host => {
            if actor.id != Some(room.host_id) {
                return Err(RoomError::NotHost);
            }
            if room.status != RoomStatus::Waiting {
                return Err(RoomError::CloseDenied(format!(
                    "a host can only close a waiting room, this one is {}",
                    room.status
                )));
            }
            if room.has_other_paying_players() {
                return Err(RoomError::CloseDenied("other players have paid in".into()));
            }
            Ok(())
        }
        ActorKind::Admin | ActorKind::System => Ok(()),
    }
}

fn random_code(rng: &mut StdRng) -> Option<RoomCode> {
    let code: String = (0..RoomCode::LEN)
        .map(|_| char::from(RoomCode::ALPHABET[rng.random_range(0..RoomCode::ALPHABET.len())]))
        .collect();
    RoomCode::parse(&code).ok()
}
