//! Drawing numbers.

use bingohall_protocol::{RoomCode, RoomStatus, UserId};
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::clock::elapsed_between;
use crate::{Draw, RoomError, RoomManager, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOutcome {
    pub number: u8,
    pub draw_order: u32,
    pub remaining: u32,
    pub is_auto: bool,
}

impl<W: Wallet> RoomManager<W> {
    /// Draws the next number, uniformly from those not yet drawn.
    ///
    /// Manual calls must come from the host and are rate limited to one
    /// per `manual_call_cooldown` after the first draw. Auto calls skip
    /// both checks; their pacing belongs to the caller's ticker.
    pub async fn call_number(
        &self,
        code: &RoomCode,
        caller: UserId,
        is_auto: bool,
    ) -> Result<DrawOutcome, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.status != RoomStatus::InProgress {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "call a number",
            });
        }

        let now = self.now();
        if !is_auto {
            if !room.is_host(caller) {
                return Err(RoomError::NotHost);
            }
            if !room.draws.is_empty() {
                let since = elapsed_between(room.last_called_at, now);
                let cooldown = self.rules().manual_call_cooldown();
                if since < cooldown {
                    let wait = cooldown - since;
                    return Err(RoomError::RateLimited {
                        retry_after_ms: wait.as_millis().max(1) as u64,
                    });
                }
            }
        }

        let undrawn: Vec<u8> = (1..=room.mode.max_number())
            .filter(|&n| !room.is_drawn(n))
            .collect();
        let Some(number) = self.with_rng(|rng| undrawn.choose(rng).copied()) else {
            return Err(RoomError::NumbersExhausted);
        };

        let draw_order = room.draws.len() as u32 + 1;
        room.draws.push(Draw {
            number,
            draw_order,
            called_at: now,
            is_auto,
        });
        room.last_called_at = now;
        room.touch(now);

        debug!(room_code = %code, number, draw_order, is_auto, "number called");

        Ok(DrawOutcome {
            number,
            draw_order,
            remaining: room.remaining(),
            is_auto,
        })
    }
}
