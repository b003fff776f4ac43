//! Background supervision: restart recovery and the periodic stall sweep.

use bingohall_protocol::{ActorKind, CancelReason, RoomStatus};
use bingohall_room::{CancelOutcome, RecoveryReport, SweepReport, Wallet};
use bingohall_tick::Ticker;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::Gateway;

pub struct Watchdog<W: Wallet> {
    gateway: Gateway<W>,
}

impl<W: Wallet> Watchdog<W> {
    pub fn new(gateway: Gateway<W>) -> Self {
        Self { gateway }
    }

    /// Settles rooms left over from a previous run and restarts the
    /// auto-callers of the games that resume.
    pub async fn recover(&self) -> RecoveryReport {
        let report = self.gateway.detector().recover_after_restart().await;
        for code in &report.resumed {
            let Ok(room) = self.gateway.manager().room_details(code).await else {
                continue;
            };
            if room.status == RoomStatus::InProgress && room.auto_call {
                self.gateway.start_auto_caller(code, room.host_id);
            }
        }
        report
    }

    /// One sweep: cancel stalled rooms, tell their watchers, and expire
    /// dead sessions.
    pub async fn sweep_once(&self) -> SweepReport {
        let report = self.gateway.detector().sweep().await;
        for stalled in &report.stalled {
            let outcome = CancelOutcome::Cancelled {
                code: stalled.code.clone(),
                reason: CancelReason::Timeout,
                refunds: stalled.refunds.clone(),
                total_refunded: stalled.total_refunded,
            };
            self.gateway.announce_cancel(&outcome, ActorKind::System).await;
        }

        let mut sessions = self.gateway.sessions().lock().await;
        let expired = sessions.expire_stale();
        sessions.cleanup_expired();
        if !expired.is_empty() {
            debug!(count = expired.len(), "sessions expired");
        }
        report
    }

    /// Sweeps every `sweep_interval` until `shutdown` changes.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.gateway.detector().config().sweep_interval();
        tokio::spawn(async move {
            let mut ticker = Ticker::every(period);
            info!(interval_secs = period.as_secs(), "failure detector running");
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.wait_for_tick() => {}
                }
                self.sweep_once().await;
                ticker.record_tick_end();
            }
            info!("failure detector stopped");
        })
    }
}
