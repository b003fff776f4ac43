//! Bingo claims and pot distribution.
//!
//! The pot splits 70 / 20 / 10 between winner, host and platform by
//! default. Both paid shares are floored; the platform keeps the remainder,
//! so the three parts always sum to the pot. A host who also played and
//! won receives both shares as two separate ledger rows.

use bingohall_card::{Segment, winning_segments};
use bingohall_protocol::{
    Amount, CardId, PatternType, PrizeSplit, RoomCode, RoomStatus, UserId,
};
use tracing::{debug, error, info};

use crate::wallet::{Memo, Posting};
use crate::{AuditEntry, AuditKind, GameRules, RoomError, RoomManager, Wallet};

/// Divides `pot` according to the configured shares.
pub fn split_pot(pot: Amount, rules: &GameRules) -> PrizeSplit {
    let winner_prize = pot.percent(rules.winner_share_pct);
    let host_prize = pot.percent(rules.host_share_pct);
    let platform_fee = Amount(pot.0.saturating_sub(winner_prize.0 + host_prize.0));
    PrizeSplit {
        winner_prize,
        host_prize,
        platform_fee,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinReport {
    pub code: RoomCode,
    pub winner_id: UserId,
    pub host_id: UserId,
    pub card_id: CardId,
    pub pattern: PatternType,
    pub split: PrizeSplit,
    /// The lines, columns or shapes that completed the pattern.
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The card does not satisfy the pattern. Nothing changed.
    Rejected { card_id: CardId, pattern: PatternType },
    Won(WinReport),
}

impl ClaimOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Won(_))
    }
}

impl<W: Wallet> RoomManager<W> {
    /// Checks a bingo claim and, when it holds, pays out and finishes the
    /// room.
    ///
    /// The first valid claim wins. Later claims on the same room fail with
    /// [`RoomError::AlreadyFinished`]. An invalid claim is not an error:
    /// it returns [`ClaimOutcome::Rejected`] and the game goes on.
    pub async fn claim_bingo(
        &self,
        code: &RoomCode,
        user_id: UserId,
        card_id: CardId,
        pattern: Option<PatternType>,
    ) -> Result<ClaimOutcome, RoomError> {
        let room_ref = self.room(code).await?;
        let mut room = room_ref.lock().await;

        if room.status.is_terminal() {
            return Err(RoomError::AlreadyFinished(code.clone()));
        }
        if room.status != RoomStatus::InProgress {
            return Err(RoomError::InvalidStatus {
                status: room.status,
                operation: "claim bingo",
            });
        }

        let card = room.card(card_id).ok_or(RoomError::CardNotFound(card_id))?;
        if card.owner != user_id {
            return Err(RoomError::CardNotOwned(card_id));
        }
        if let Some(claimed) = pattern {
            if claimed != room.pattern {
                return Err(RoomError::PatternMismatch {
                    claimed,
                    required: room.pattern,
                });
            }
        }

        let segments = winning_segments(&card.grid, &card.marks, room.pattern);
        if segments.is_empty() {
            debug!(room_code = %code, %user_id, %card_id, "bingo claim rejected");
            return Ok(ClaimOutcome::Rejected {
                card_id,
                pattern: room.pattern,
            });
        }

        let pot = room.total_pot;
        let split = split_pot(pot, self.rules());
        let host_id = room.host_id;

        let mut postings = Vec::with_capacity(2);
        if !split.winner_prize.is_zero() {
            postings.push(
                Posting::credit(user_id, room.currency, split.winner_prize, Memo::WinnerPrize)
                    .for_room(room.id),
            );
        }
        if !split.host_prize.is_zero() {
            postings.push(
                Posting::credit(host_id, room.currency, split.host_prize, Memo::HostPrize)
                    .for_room(room.id),
            );
        }
        if !postings.is_empty() {
            if let Err(err) = self.wallet().apply(postings).await {
                error!(room_code = %code, error = %err, "prize payout failed, room left in progress");
                return Err(err.into());
            }
        }

        let now = self.now();
        room.status = RoomStatus::Finished;
        room.winner_id = Some(user_id);
        room.finished_at = Some(now);
        room.touch(now);
        if let Some(winner) = room.player_mut(user_id) {
            winner.winnings = winner.winnings.checked_add(split.winner_prize).unwrap_or(winner.winnings);
        }
        if let Some(host) = room.player_mut(host_id) {
            host.winnings = host.winnings.checked_add(split.host_prize).unwrap_or(host.winnings);
        }

        let rules = self.rules();
        let players: Vec<UserId> = room.players.iter().map(|p| p.user_id).collect();
        for player in players {
            let won = player == user_id;
            let prize = split.winner_prize;
            self.store()
                .update_stats(player, |stats| {
                    stats.games_played += 1;
                    if won {
                        stats.games_won += 1;
                        stats.experience += rules.win_xp;
                        stats.total_winnings =
                            stats.total_winnings.checked_add(prize).unwrap_or(stats.total_winnings);
                    } else {
                        stats.experience += rules.play_xp;
                    }
                })
                .await;
        }

        self.store()
            .append_audit(AuditEntry {
                room_id: room.id,
                code: code.clone(),
                at: now,
                kind: AuditKind::PrizeDistributed {
                    winner_id: user_id,
                    host_id,
                    card_id,
                    pot,
                    split,
                },
            })
            .await;

        info!(
            room_code = %code,
            winner_id = %user_id,
            %card_id,
            %pot,
            winner_prize = %split.winner_prize,
            host_prize = %split.host_prize,
            platform_fee = %split.platform_fee,
            "bingo, prize distributed"
        );

        Ok(ClaimOutcome::Won(WinReport {
            code: code.clone(),
            winner_id: user_id,
            host_id,
            card_id,
            pattern: room.pattern,
            split,
            segments,
        }))
    }
}
