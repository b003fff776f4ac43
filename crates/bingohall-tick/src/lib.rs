//! Fixed-period ticker for Bingo Hall.
//!
//! Two loops in the hall run on a timer: each room's auto-caller (a draw
//! every few seconds) and the failure-detector sweep (every few minutes).
//! Both use a [`Ticker`] inside a `tokio::select!` so a stop command can
//! interrupt the wait:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = stop_rx.recv() => break,
//!         info = ticker.wait_for_tick() => {
//!             call_next_number().await;
//!             ticker.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! All timing goes through `tokio::time`, so tests can run with
//! `start_paused = true` and step time forward deterministically.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired noticeably late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-period ticker. One per loop.
///
/// A late wake-up never produces a burst: missed ticks are dropped and the
/// next one is scheduled a full period after the late tick.
pub struct Ticker {
    period: Duration,
    tick_count: u64,
    next_tick: Option<Instant>,
    tick_start: Option<Instant>,
}

impl Ticker {
    /// Creates a ticker whose first tick is one period away.
    /// `Duration::ZERO` gives a ticker that never fires.
    pub fn every(period: Duration) -> Self {
        let next_tick = (!period.is_zero()).then(|| Instant::now() + period);
        if next_tick.is_none() {
            debug!("ticker created with zero period (never fires)");
        } else {
            debug!(period_ms = period.as_millis() as u64, "ticker created");
        }

        Self {
            period,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever when the period is zero, which lets `tokio::select!`
    /// keep serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            return std::future::pending().await;
        };
        let period = self.period;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let mut ticks_skipped = 0u64;
        if overrun {
            ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "tick overrun, skipping ahead"
                );
            }
        }
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the work for the current tick finished.
    ///
    /// Returns how long the body took, and warns when that exceeded the
    /// period itself. `None` if no tick is in progress.
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();
        if elapsed >= self.period {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                "tick body exceeded its period"
            );
        }
        Some(elapsed)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
