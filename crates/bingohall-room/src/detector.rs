//! Finds abandoned games and gives the money back.
//!
//! A sweep looks at every in-progress room:
//!
//! - manual calling and no activity for `manual_host_timeout`: the host
//!   walked away (`host_absent`),
//! - any room with no activity for `inactivity_timeout`: the table went
//!   quiet (`inactive`).
//!
//! Either way the room is cancelled with reason `timeout`, every player is
//! refunded, and the room is flagged stalled. One room failing (a wallet
//! outage, say) is logged and alerted and does not stop the sweep; the
//! room stays in progress and is retried on the next pass.

use std::sync::Arc;

use bingohall_protocol::{
    Amount, CancelReason, RefundView, RoomCode, RoomId, RoomStatus, StallReason,
    StalledRoomReport,
};
use bingohall_session::UserContext;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::clock::elapsed_between;
use crate::{
    Actor, Alert, AlertSink, AuditEntry, AuditKind, CancelOutcome, DetectorConfig, LogAlerts,
    RoomError, RoomManager, Wallet,
};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledRoom {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub reason: StallReason,
    pub refunds: Vec<RefundView>,
    pub total_refunded: Amount,
}

/// A room the sweep could not settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub code: RoomCode,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub stalled: Vec<StalledRoom>,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub examined: usize,
    /// Rooms idle past the restart grace, cancelled and refunded.
    pub cancelled: Vec<RoomCode>,
    /// Rooms kept; their players are marked disconnected until they return.
    pub resumed: Vec<RoomCode>,
    pub failures: Vec<SweepFailure>,
}

// ---------------------------------------------------------------------------
// FailureDetector
// ---------------------------------------------------------------------------

pub struct FailureDetector<W: Wallet> {
    manager: Arc<RoomManager<W>>,
    config: DetectorConfig,
    alerts: Arc<dyn AlertSink>,
}

impl<W: Wallet> FailureDetector<W> {
    pub fn new(manager: Arc<RoomManager<W>>, config: DetectorConfig) -> Self {
        Self {
            manager,
            config,
            alerts: Arc::new(LogAlerts),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// One pass over every room, at the manager's current time.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(self.manager.now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for room_ref in self.manager.store().all().await {
            let mut room = room_ref.lock().await;
            if room.status != RoomStatus::InProgress || room.is_stalled {
                continue;
            }
            report.examined += 1;

            let idle = elapsed_between(room.last_activity_at, now);
            let reason = if !room.auto_call && idle >= self.config.manual_host_timeout() {
                StallReason::HostAbsent
            } else if idle >= self.config.inactivity_timeout() {
                StallReason::Inactive
            } else {
                continue;
            };

            let code = room.code.clone();
            debug!(room_code = %code, idle_secs = idle.as_secs(), %reason, "room looks stalled");

            match self
                .manager
                .cancel_locked(&mut room, Actor::system(), CancelReason::Timeout, now)
                .await
            {
                Ok(CancelOutcome::Cancelled {
                    refunds,
                    total_refunded,
                    ..
                }) => {
                    room.is_stalled = true;
                    room.stall_reason = Some(reason);
                    self.manager
                        .store()
                        .append_audit(AuditEntry {
                            room_id: room.id,
                            code: code.clone(),
                            at: now,
                            kind: AuditKind::RoomStalled { reason },
                        })
                        .await;
                    warn!(room_code = %code, %reason, refunded = %total_refunded, "stalled room refunded");
                    report.stalled.push(StalledRoom {
                        room_id: room.id,
                        code,
                        reason,
                        refunds,
                        total_refunded,
                    });
                }
                Ok(CancelOutcome::AlreadyClosed { .. }) => {}
                Err(err) => {
                    error!(room_code = %code, error = %err, "could not refund stalled room");
                    self.alerts.alert(Alert::critical(
                        Some(code.clone()),
                        format!("refund of stalled room {code} failed: {err}"),
                    ));
                    report.failures.push(SweepFailure {
                        code,
                        error: err.to_string(),
                    });
                }
            }
        }

        if !report.stalled.is_empty() || !report.failures.is_empty() {
            info!(
                examined = report.examined,
                stalled = report.stalled.len(),
                failed = report.failures.len(),
                "sweep finished"
            );
        }
        report
    }

    /// Startup pass after a restart.
    ///
    /// In-progress rooms idle longer than `restart_grace` are cancelled
    /// with reason `server_restart`. Every other live room is kept, with
    /// all its players marked disconnected: no socket survived the restart.
    pub async fn recover_after_restart(&self) -> RecoveryReport {
        let now = self.manager.now();
        let mut report = RecoveryReport::default();

        for room_ref in self.manager.store().all().await {
            let mut room = room_ref.lock().await;
            if room.status.is_terminal() {
                continue;
            }
            report.examined += 1;
            let code = room.code.clone();

            let idle = elapsed_between(room.last_activity_at, now);
            if room.status == RoomStatus::InProgress && idle >= self.config.restart_grace() {
                match self
                    .manager
                    .cancel_locked(&mut room, Actor::system(), CancelReason::ServerRestart, now)
                    .await
                {
                    Ok(_) => report.cancelled.push(code),
                    Err(err) => {
                        error!(room_code = %code, error = %err, "could not refund room after restart");
                        self.alerts.alert(Alert::critical(
                            Some(code.clone()),
                            format!("restart refund of {code} failed: {err}"),
                        ));
                        report.failures.push(SweepFailure {
                            code,
                            error: err.to_string(),
                        });
                    }
                }
                continue;
            }

            for player in &mut room.players {
                player.is_connected = false;
            }
            report.resumed.push(code);
        }

        info!(
            examined = report.examined,
            cancelled = report.cancelled.len(),
            resumed = report.resumed.len(),
            failed = report.failures.len(),
            "restart recovery finished"
        );
        report
    }

    /// Every room a sweep has flagged, with what was refunded.
    pub async fn stalled_rooms(&self) -> Vec<StalledRoomReport> {
        let mut reports = Vec::new();
        for room_ref in self.manager.store().all().await {
            let (room_id, code, reason, status, last_activity_at) = {
                let room = room_ref.lock().await;
                let Some(reason) = room.stall_reason.filter(|_| room.is_stalled) else {
                    continue;
                };
                (
                    room.id,
                    room.code.clone(),
                    reason,
                    room.status,
                    room.last_activity_at,
                )
            };
            let refunded: Amount = self
                .manager
                .refunds_for(room_id)
                .await
                .iter()
                .map(|r| r.amount)
                .sum();
            reports.push(StalledRoomReport {
                room_id,
                code,
                reason,
                status,
                last_activity_at,
                refunded,
            });
        }
        reports
    }

    /// Admin override: cancel and refund a live room regardless of host
    /// rules.
    pub async fn force_refund(
        &self,
        code: &RoomCode,
        admin: &UserContext,
    ) -> Result<CancelOutcome, RoomError> {
        if !admin.is_admin() {
            warn!(room_code = %code, user_id = %admin.id, "refund override refused");
            return Err(RoomError::Forbidden("admin role required".into()));
        }
        info!(room_code = %code, admin_id = %admin.id, "admin forced refund");
        self.manager
            .cancel_room(code, Actor::admin(admin.id), CancelReason::AdminForced)
            .await
    }
}
