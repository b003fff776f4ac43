//! The realtime gateway: one entry point for every client command.
//!
//! [`Gateway::handle`] takes a decoded [`Command`], runs it against the
//! room engine, broadcasts whatever the room's watchers need to see, and
//! returns the reply for the caller. It knows nothing about sockets; the
//! connection handler feeds it commands and drains the subscriber's queue.
//!
//! Disconnects go through [`Gateway::on_disconnect`]. When a host's last
//! connection drops in the middle of a game, the game is kept alive by
//! forcing auto-call (power users) or, failing that, cancelled after the
//! grace period if the host has not come back.

use std::sync::Arc;
use std::time::Duration;

use bingohall_protocol::{ActorKind, CancelReason, Command, Event, RoomCode, RoomStatus, UserId};
use bingohall_room::{
    Actor, CancelOutcome, ClaimOutcome, FailureDetector, RoomError, RoomManager, Wallet,
};
use bingohall_session::{SessionConfig, SessionManager, UserContext};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AutoCallers, HallError, RoomChannels, Subscriber};

/// Longest chat message, in characters, after trimming.
pub const MAX_CHAT_CHARS: usize = 500;

pub struct Gateway<W: Wallet> {
    manager: Arc<RoomManager<W>>,
    detector: Arc<FailureDetector<W>>,
    channels: Arc<RoomChannels>,
    autocallers: Arc<AutoCallers>,
    sessions: Arc<Mutex<SessionManager>>,
    host_grace: Duration,
}

impl<W: Wallet> Clone for Gateway<W> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            detector: Arc::clone(&self.detector),
            channels: Arc::clone(&self.channels),
            autocallers: Arc::clone(&self.autocallers),
            sessions: Arc::clone(&self.sessions),
            host_grace: self.host_grace,
        }
    }
}

impl<W: Wallet> Gateway<W> {
    pub fn new(
        manager: Arc<RoomManager<W>>,
        detector: Arc<FailureDetector<W>>,
        session_config: SessionConfig,
    ) -> Self {
        let host_grace = detector.config().host_disconnect_grace();
        let autocallers = Arc::new(AutoCallers::new(manager.rules().auto_call_interval()));
        Self {
            manager,
            detector,
            channels: Arc::new(RoomChannels::new()),
            autocallers,
            sessions: Arc::new(Mutex::new(SessionManager::new(session_config))),
            host_grace,
        }
    }

    pub fn manager(&self) -> &Arc<RoomManager<W>> {
        &self.manager
    }

    pub fn detector(&self) -> &Arc<FailureDetector<W>> {
        &self.detector
    }

    pub fn channels(&self) -> &Arc<RoomChannels> {
        &self.channels
    }

    pub fn autocallers(&self) -> &Arc<AutoCallers> {
        &self.autocallers
    }

    pub fn sessions(&self) -> &Arc<Mutex<SessionManager>> {
        &self.sessions
    }

    /// Registers a new connection for `user`.
    pub async fn connect(&self, user: &UserContext) {
        self.sessions.lock().await.connect(user.clone());
    }

    /// Runs one command and returns the caller's reply.
    pub async fn handle(
        &self,
        conn: &Subscriber,
        user: &UserContext,
        command: Command,
    ) -> Result<Event, HallError> {
        let name = command_name(&command);
        let result = self.dispatch(conn, user, command).await;
        if let Err(err) = &result {
            debug!(user_id = %user.id, command = name, code = err.code(), error = %err, "command rejected");
        }
        result
    }

    async fn dispatch(
        &self,
        conn: &Subscriber,
        user: &UserContext,
        command: Command,
    ) -> Result<Event, HallError> {
        match command {
            Command::CreateRoom(settings) => {
                let room = self.manager.create_room(user, settings).await?;
                self.channels.subscribe(&room.code, conn).await;
                Ok(Event::RoomCreated { room })
            }

            Command::JoinRoom { code, card_count } => {
                let joined = self.manager.join_room(&code, user, card_count).await?;
                self.channels.subscribe(&code, conn).await;
                let room = if joined.already_joined {
                    self.manager.set_connected(&code, user.id, true).await?;
                    self.manager.room_details(&code).await?
                } else {
                    self.channels
                        .broadcast(&code, Event::RoomState { room: joined.room.clone() })
                        .await;
                    joined.room
                };
                Ok(Event::Joined {
                    room,
                    cards: joined.cards,
                    already_joined: joined.already_joined,
                })
            }

            Command::WatchRoom { code } => {
                let room = self.manager.room_details(&code).await?;
                self.channels.subscribe(&code, conn).await;
                if room.players.iter().any(|p| p.user_id == user.id) {
                    self.manager.set_connected(&code, user.id, true).await?;
                    return Ok(Event::Joined {
                        room: self.manager.room_details(&code).await?,
                        cards: self.manager.cards_of(&code, user.id).await?,
                        already_joined: true,
                    });
                }
                Ok(Event::RoomState { room })
            }

            Command::LeaveRoom { code } => {
                self.channels.unsubscribe(&code, conn.id()).await;
                Ok(Event::Left { code })
            }

            Command::GetRoom { code } => Ok(Event::RoomState {
                room: self.manager.room_details(&code).await?,
            }),

            Command::ListRooms => Ok(Event::RoomList {
                rooms: self.manager.list_waiting_rooms().await,
            }),

            Command::StartGame { code } => {
                let room = self.manager.start_game(&code, user.id).await?;
                if room.auto_call {
                    self.start_auto_caller(&code, room.host_id);
                }
                self.channels
                    .broadcast(&code, Event::RoomState { room: room.clone() })
                    .await;
                Ok(Event::RoomState { room })
            }

            Command::CallNumber { code } => {
                let draw = self.manager.call_number(&code, user.id, false).await?;
                let event = Event::NumberCalled {
                    code: code.clone(),
                    number: draw.number,
                    draw_order: draw.draw_order,
                    remaining: draw.remaining,
                    is_auto: false,
                };
                self.channels.broadcast(&code, event.clone()).await;
                Ok(event)
            }

            Command::MarkNumber {
                code,
                card_id,
                position,
            } => {
                let mark = self
                    .manager
                    .mark_number(&code, user.id, card_id, position)
                    .await?;
                let event = Event::NumberMarked {
                    code: code.clone(),
                    user_id: user.id,
                    card_id,
                    position,
                    number: mark.number,
                };
                if mark.fresh {
                    self.channels.broadcast(&code, event.clone()).await;
                }
                Ok(event)
            }

            Command::ClaimBingo {
                code,
                card_id,
                pattern,
            } => match self
                .manager
                .claim_bingo(&code, user.id, card_id, pattern)
                .await?
            {
                ClaimOutcome::Rejected { card_id, pattern } => Ok(Event::ClaimRejected {
                    code,
                    card_id,
                    pattern,
                }),
                ClaimOutcome::Won(report) => {
                    self.autocallers.stop(&code);
                    let event = Event::GameOver {
                        code: code.clone(),
                        winner_id: report.winner_id,
                        card_id: report.card_id,
                        pattern: report.pattern,
                        split: report.split,
                    };
                    self.channels.broadcast(&code, event.clone()).await;
                    let room = self.manager.room_details(&code).await?;
                    self.channels.broadcast(&code, Event::RoomState { room }).await;
                    Ok(event)
                }
            },

            Command::SetAutoCall { code, enabled } => {
                let room = self.manager.set_auto_call(&code, user, enabled).await?;
                let event = if room.auto_call {
                    if room.status == RoomStatus::InProgress {
                        self.start_auto_caller(&code, room.host_id);
                    }
                    Event::AutoCallEnabled { code: code.clone() }
                } else {
                    self.autocallers.stop(&code);
                    Event::AutoCallDisabled { code: code.clone() }
                };
                self.channels.broadcast(&code, event.clone()).await;
                Ok(event)
            }

            Command::SetReady { code, ready } => {
                let room = self.manager.set_ready(&code, user.id, ready).await?;
                self.channels
                    .broadcast(&code, Event::RoomState { room: room.clone() })
                    .await;
                Ok(Event::RoomState { room })
            }

            Command::Chat { code, text } => {
                let text = text.trim();
                if text.is_empty() || text.chars().count() > MAX_CHAT_CHARS {
                    return Err(HallError::BadRequest(format!(
                        "chat text must be 1 to {MAX_CHAT_CHARS} characters"
                    )));
                }
                if !self.channels.is_subscribed(&code, conn.id()).await {
                    return Err(HallError::BadRequest(format!(
                        "watch room {code} before chatting in it"
                    )));
                }
                let event = Event::Chat {
                    code: code.clone(),
                    user_id: user.id,
                    username: user.username.clone(),
                    text: text.to_string(),
                    sent_at: self.manager.now(),
                };
                self.channels.broadcast(&code, event.clone()).await;
                Ok(event)
            }

            Command::CloseRoom { code } => {
                let room = self.manager.room_details(&code).await?;
                let (actor, reason) = if room.host_id == user.id {
                    (Actor::host(user.id), CancelReason::HostClosed)
                } else if user.is_admin() {
                    (Actor::admin(user.id), CancelReason::AdminForced)
                } else {
                    return Err(RoomError::NotHost.into());
                };
                let outcome = self.manager.cancel_room(&code, actor, reason).await?;
                Ok(self.announce_cancel(&outcome, actor.kind).await)
            }

            Command::StalledRooms => {
                if !user.is_admin() {
                    return Err(RoomError::Forbidden("admin role required".into()).into());
                }
                Ok(Event::StalledRooms {
                    rooms: self.detector.stalled_rooms().await,
                })
            }

            Command::ForceRefund { code } => {
                let outcome = self.detector.force_refund(&code, user).await?;
                Ok(self.announce_cancel(&outcome, ActorKind::Admin).await)
            }
        }
    }

    // -- Lifecycle helpers -------------------------------------------------

    pub(crate) fn start_auto_caller(&self, code: &RoomCode, host_id: UserId) -> bool {
        self.autocallers.start(
            code,
            host_id,
            Arc::clone(&self.manager),
            Arc::clone(&self.channels),
        )
    }

    /// Tells a cancelled room's watchers, and stops its auto-caller.
    /// Returns the event, or `already_closed` if nothing happened.
    pub(crate) async fn announce_cancel(&self, outcome: &CancelOutcome, actor: ActorKind) -> Event {
        match outcome {
            CancelOutcome::Cancelled {
                code,
                reason,
                refunds,
                ..
            } => {
                self.autocallers.stop(code);
                let event = Event::RoomCancelled {
                    code: code.clone(),
                    reason: *reason,
                    actor,
                    refunds: refunds.clone(),
                };
                self.channels.broadcast(code, event.clone()).await;
                event
            }
            CancelOutcome::AlreadyClosed { code, status } => Event::AlreadyClosed {
                code: code.clone(),
                status: *status,
            },
        }
    }

    // -- Disconnects -------------------------------------------------------

    /// Cleans up after a closed connection.
    ///
    /// Returns the deferred host checks it scheduled, one per room where a
    /// non-power host left a manual game running.
    pub async fn on_disconnect(&self, conn: &Subscriber, user: &UserContext) -> Vec<JoinHandle<()>> {
        let rooms = self.channels.unsubscribe_all(conn.id()).await;
        let last = match self.sessions.lock().await.disconnect(user.id) {
            Ok(last) => last,
            Err(err) => {
                debug!(user_id = %user.id, error = %err, "disconnect without a session");
                true
            }
        };
        if !last {
            return Vec::new();
        }

        let mut checks = Vec::new();
        for code in rooms {
            if let Some(check) = self.user_left(&code, user).await {
                checks.push(check);
            }
        }
        checks
    }

    async fn user_left(&self, code: &RoomCode, user: &UserContext) -> Option<JoinHandle<()>> {
        match self.manager.set_connected(code, user.id, false).await {
            Ok(true) => {
                if let Ok(room) = self.manager.room_details(code).await {
                    self.channels.broadcast(code, Event::RoomState { room }).await;
                }
            }
            Ok(false) => {}
            Err(err) => {
                debug!(room_code = %code, error = %err, "presence update skipped");
                return None;
            }
        }

        let room = self.manager.room_details(code).await.ok()?;
        if room.host_id != user.id || room.status != RoomStatus::InProgress || room.auto_call {
            return None;
        }

        if self.manager.rules().is_power_user(user.experience) {
            match self.manager.force_auto_call(code).await {
                Ok(true) => {
                    self.start_auto_caller(code, room.host_id);
                    info!(room_code = %code, host_id = %user.id, "host left, auto-call forced on");
                    self.channels
                        .broadcast(
                            code,
                            Event::AutoCallForced {
                                code: code.clone(),
                                reason: "host disconnected".into(),
                            },
                        )
                        .await;
                }
                Ok(false) => {}
                Err(err) => warn!(room_code = %code, error = %err, "could not force auto-call"),
            }
            return None;
        }

        info!(
            room_code = %code,
            host_id = %user.id,
            grace_secs = self.host_grace.as_secs(),
            "host left a manual game, waiting before cancelling"
        );
        Some(self.schedule_host_check(code.clone(), user.id))
    }

    fn schedule_host_check(&self, code: RoomCode, host_id: UserId) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(gateway.host_grace).await;
            let connected = gateway.sessions.lock().await.is_connected(&host_id);
            match gateway.manager.host_disconnect_check(&code, connected).await {
                Ok(Some(outcome)) => {
                    gateway.announce_cancel(&outcome, ActorKind::System).await;
                }
                Ok(None) => {}
                Err(err) => warn!(room_code = %code, error = %err, "host check failed"),
            }
        })
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::CreateRoom(_) => "create_room",
        Command::JoinRoom { .. } => "join_room",
        Command::WatchRoom { .. } => "watch_room",
        Command::LeaveRoom { .. } => "leave_room",
        Command::GetRoom { .. } => "get_room",
        Command::ListRooms => "list_rooms",
        Command::StartGame { .. } => "start_game",
        Command::CallNumber { .. } => "call_number",
        Command::MarkNumber { .. } => "mark_number",
        Command::ClaimBingo { .. } => "claim_bingo",
        Command::SetAutoCall { .. } => "set_auto_call",
        Command::SetReady { .. } => "set_ready",
        Command::Chat { .. } => "chat",
        Command::CloseRoom { .. } => "close_room",
        Command::StalledRooms => "stalled_rooms",
        Command::ForceRefund { .. } => "force_refund",
    }
}
