//! Per-room auto-call actors.
//!
//! Each room with auto-call on gets one task that owns a [`Ticker`] and
//! draws a number every interval, broadcasting the result. The task ends
//! when it is stopped, or when a draw fails for a reason that will not go
//! away (the game finished, was cancelled, or ran out of numbers). A
//! rate-limit style failure is retried on the next tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bingohall_protocol::{Event, RoomCode, UserId};
use bingohall_room::{RoomManager, Wallet};
use bingohall_tick::Ticker;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::RoomChannels;

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// The set of running auto-call actors, keyed by room.
pub struct AutoCallers {
    interval: Duration,
    running: Mutex<HashMap<RoomCode, Running>>,
}

impl AutoCallers {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts calling numbers in `code`. Returns `false` if an actor is
    /// already running there.
    pub fn start<W: Wallet>(
        &self,
        code: &RoomCode,
        host_id: UserId,
        manager: Arc<RoomManager<W>>,
        channels: Arc<RoomChannels>,
    ) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.get(code).is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(call_loop(
            code.clone(),
            host_id,
            self.interval,
            manager,
            channels,
            stop_rx,
        ));
        running.insert(code.clone(), Running { stop, task });
        info!(room_code = %code, interval_ms = self.interval.as_millis() as u64, "auto-caller started");
        true
    }

    /// Stops the actor for `code`. Returns `false` if none was running.
    pub fn stop(&self, code: &RoomCode) -> bool {
        let removed = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(code);
        match removed {
            Some(running) => {
                let was_live = !running.task.is_finished();
                let _ = running.stop.send(());
                if was_live {
                    debug!(room_code = %code, "auto-caller stop requested");
                }
                was_live
            }
            None => false,
        }
    }

    pub fn is_running(&self, code: &RoomCode) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn running_count(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| !r.task.is_finished())
            .count()
    }

    pub fn stop_all(&self) {
        let drained: Vec<_> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, running) in drained {
            let _ = running.stop.send(());
        }
    }
}

async fn call_loop<W: Wallet>(
    code: RoomCode,
    host_id: UserId,
    interval: Duration,
    manager: Arc<RoomManager<W>>,
    channels: Arc<RoomChannels>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = Ticker::every(interval);
    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(room_code = %code, "auto-caller stopped");
                return;
            }
            _ = ticker.wait_for_tick() => {}
        }

        let result = manager.call_number(&code, host_id, true).await;
        ticker.record_tick_end();

        match result {
            Ok(draw) => {
                channels
                    .broadcast(
                        &code,
                        Event::NumberCalled {
                            code: code.clone(),
                            number: draw.number,
                            draw_order: draw.draw_order,
                            remaining: draw.remaining,
                            is_auto: true,
                        },
                    )
                    .await;
            }
            Err(err) if err.is_retryable() => {
                debug!(room_code = %code, error = %err, "auto-call deferred");
            }
            Err(err) => {
                info!(room_code = %code, error = %err, "auto-caller finished");
                return;
            }
        }
    }
}
