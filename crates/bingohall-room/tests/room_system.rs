//! Integration tests for the room engine: whole games, cancellations,
//! stall sweeps, and restart recovery against a controllable clock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bingohall_protocol::{
    Amount, CancelReason, Currency, GameMode, PatternType, Position, RoomCode, RoomSettings,
    RoomStatus, StallReason, UserId,
};
use bingohall_room::wallet::Posting;
use bingohall_room::{
    Actor, Alert, AlertSink, AuditKind, CancelOutcome, ClaimOutcome, DetectorConfig,
    FailureDetector, LedgerEntry, ManualClock, MemoryWallet, RoomError, RoomManager, RoomStore,
    Severity, Wallet, WalletError,
};
use bingohall_session::{ADMIN_ROLE, UserContext};
use chrono::DateTime;

// =========================================================================
// Helpers
// =========================================================================

const HOST: UserId = UserId(1);
const ANA: UserId = UserId(2);
const BOB: UserId = UserId(3);

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ))
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn settings(pattern: PatternType, card_cost: u64, max_players: u32) -> RoomSettings {
    RoomSettings {
        mode: GameMode::Seventy5,
        pattern,
        currency: Currency::Coins,
        card_cost: Amount(card_cost),
        max_players,
    }
}

fn user(id: UserId, xp: u32) -> UserContext {
    UserContext::new(id, format!("user{}", id.0), xp)
}

async fn funded_wallet(clock: &Arc<ManualClock>, users: &[UserId], amount: u64) -> Arc<MemoryWallet> {
    let wallet = Arc::new(MemoryWallet::with_clock(clock.clone()));
    for &id in users {
        wallet
            .deposit(id, Currency::Coins, Amount(amount))
            .await
            .unwrap();
    }
    wallet
}

fn manager<W: Wallet>(wallet: Arc<W>, clock: &Arc<ManualClock>) -> Arc<RoomManager<W>> {
    Arc::new(
        RoomManager::new(wallet)
            .with_clock(clock.clone())
            .with_seed(11),
    )
}

/// Creates a room, seats `players` with one card each, and starts it.
async fn running_room<W: Wallet>(
    mgr: &RoomManager<W>,
    host: &UserContext,
    players: &[UserId],
    card_cost: u64,
) -> RoomCode {
    let room = mgr
        .create_room(host, settings(PatternType::Line, card_cost, 10))
        .await
        .unwrap();
    for &id in players {
        mgr.join_room(&room.code, &user(id, 0), 1).await.unwrap();
    }
    mgr.start_game(&room.code, host.id).await.unwrap();
    room.code
}

async fn coins(wallet: &MemoryWallet, id: UserId) -> u64 {
    wallet.balance(id, Currency::Coins).await.unwrap().0
}

/// Fails every batch that touches `broken`, while it is set.
struct FlakyWallet {
    inner: MemoryWallet,
    broken: AtomicU64,
}

impl FlakyWallet {
    fn new(inner: MemoryWallet) -> Self {
        Self {
            inner,
            broken: AtomicU64::new(0),
        }
    }

    fn break_for(&self, id: UserId) {
        self.broken.store(id.0, Ordering::SeqCst);
    }

    fn heal(&self) {
        self.broken.store(0, Ordering::SeqCst);
    }
}

impl Wallet for FlakyWallet {
    async fn balance(&self, user_id: UserId, currency: Currency) -> Result<Amount, WalletError> {
        self.inner.balance(user_id, currency).await
    }

    async fn apply(&self, postings: Vec<Posting>) -> Result<Vec<LedgerEntry>, WalletError> {
        let broken = self.broken.load(Ordering::SeqCst);
        if postings.iter().any(|p| p.user_id.0 == broken) {
            return Err(WalletError::Unavailable("ledger offline".into()));
        }
        self.inner.apply(postings).await
    }
}

#[derive(Default)]
struct RecordingAlerts(Mutex<Vec<Alert>>);

impl RecordingAlerts {
    fn taken(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, alert: Alert) {
        self.0.lock().unwrap().push(alert);
    }
}

// =========================================================================
// Full games
// =========================================================================

#[tokio::test]
async fn test_two_player_game_pays_fourteen_and_four() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let code = running_room(&mgr, &user(HOST, 0), &[ANA, BOB], 10).await;
    let card = mgr.cards_of(&code, ANA).await.unwrap()[0].id;

    for _ in 0..75 {
        mgr.call_number(&code, HOST, true).await.unwrap();
    }
    for col in 0..5 {
        mgr.mark_number(&code, ANA, card, Position::new(0, col))
            .await
            .unwrap();
    }
    let outcome = mgr.claim_bingo(&code, ANA, card, None).await.unwrap();
    let ClaimOutcome::Won(report) = outcome else {
        panic!("row 0 is complete");
    };
    assert_eq!(report.split.platform_fee, Amount(2));

    assert_eq!(coins(&wallet, ANA).await, 104);
    assert_eq!(coins(&wallet, BOB).await, 90);
    assert_eq!(coins(&wallet, HOST).await, 4);

    // Money is conserved: every coin is in a wallet or the platform fee.
    let total = coins(&wallet, ANA).await + coins(&wallet, BOB).await + coins(&wallet, HOST).await;
    assert_eq!(total + report.split.platform_fee.0, 200);
}

#[tokio::test]
async fn test_host_who_plays_and_wins_gets_two_ledger_rows() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[HOST, ANA], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let host = user(HOST, 0);
    let code = running_room(&mgr, &host, &[HOST, ANA], 10).await;
    let card = mgr.cards_of(&code, HOST).await.unwrap()[0].id;
    for _ in 0..75 {
        mgr.call_number(&code, HOST, true).await.unwrap();
    }
    for col in 0..5 {
        mgr.mark_number(&code, HOST, card, Position::new(0, col))
            .await
            .unwrap();
    }
    assert!(mgr.claim_bingo(&code, HOST, card, None).await.unwrap().is_valid());

    let prizes: Vec<u64> = wallet
        .ledger_for(HOST)
        .await
        .iter()
        .filter(|e| e.room_id.is_some())
        .map(|e| e.amount.0)
        .collect();
    assert_eq!(prizes, vec![10, 14, 4], "purchase, winner prize, host prize");
    assert_eq!(coins(&wallet, HOST).await, 108);

    let room = mgr.room_details(&code).await.unwrap();
    let seat = room.players.iter().find(|p| p.user_id == HOST).unwrap();
    assert_eq!(seat.winnings, Amount(18));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let code = running_room(&mgr, &user(HOST, 0), &[ANA, BOB], 10).await;
    for _ in 0..75 {
        mgr.call_number(&code, HOST, true).await.unwrap();
    }
    let mut cards = Vec::new();
    for id in [ANA, BOB] {
        let card = mgr.cards_of(&code, id).await.unwrap()[0].id;
        for col in 0..5 {
            mgr.mark_number(&code, id, card, Position::new(0, col))
                .await
                .unwrap();
        }
        cards.push((id, card));
    }

    let handles: Vec<_> = cards
        .into_iter()
        .map(|(id, card)| {
            let mgr = mgr.clone();
            let code = code.clone();
            tokio::spawn(async move { mgr.claim_bingo(&code, id, card, None).await })
        })
        .collect();

    let mut winners = 0;
    let mut late = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ClaimOutcome::Won(_)) => winners += 1,
            Err(RoomError::AlreadyFinished(_)) => late += 1,
            other => panic!("unexpected claim result: {other:?}"),
        }
    }
    assert_eq!((winners, late), (1, 1));
    assert_eq!(coins(&wallet, HOST).await, 4, "host paid exactly once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_calls_never_repeat_a_number() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let room = mgr
        .create_room(
            &user(HOST, 0),
            RoomSettings {
                mode: GameMode::Ninety,
                ..settings(PatternType::FullCard, 10, 10)
            },
        )
        .await
        .unwrap();
    for id in [ANA, BOB] {
        mgr.join_room(&room.code, &user(id, 0), 1).await.unwrap();
    }
    mgr.start_game(&room.code, HOST).await.unwrap();

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let mgr = mgr.clone();
            let code = room.code.clone();
            tokio::spawn(async move { mgr.call_number(&code, HOST, true).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    let mut orders = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(draw) => {
                assert!(numbers.insert(draw.number), "{} drawn twice", draw.number);
                orders.push(draw.draw_order);
            }
            Err(RoomError::NumbersExhausted) => exhausted += 1,
            Err(other) => panic!("unexpected call error: {other}"),
        }
    }
    assert_eq!((numbers.len(), exhausted), (90, 110));
    orders.sort_unstable();
    assert_eq!(orders, (1..=90).collect::<Vec<u32>>());

    let view = mgr.room_details(&room.code).await.unwrap();
    assert_eq!(view.drawn.len(), 90);
    assert_eq!(view.drawn.iter().collect::<HashSet<_>>().len(), 90);

    // Two admins racing to cancel refund the players once.
    let cancels: Vec<_> = [UserId(98), UserId(99)]
        .into_iter()
        .map(|admin| {
            let mgr = mgr.clone();
            let code = room.code.clone();
            tokio::spawn(async move {
                mgr.cancel_room(&code, Actor::admin(admin), CancelReason::AdminForced)
                    .await
            })
        })
        .collect();
    let mut cancelled = 0;
    for handle in cancels {
        match handle.await.unwrap().unwrap() {
            CancelOutcome::Cancelled { total_refunded, .. } => {
                assert_eq!(total_refunded, Amount(20));
                cancelled += 1;
            }
            CancelOutcome::AlreadyClosed { status, .. } => {
                assert_eq!(status, RoomStatus::Cancelled);
            }
        }
    }
    assert_eq!(cancelled, 1);
    assert_eq!(coins(&wallet, ANA).await, 100);
    assert_eq!(coins(&wallet, BOB).await, 100);
    assert_eq!(mgr.refunds_for(view.id).await.len(), 2);
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_repeated_join_charges_once() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let room = mgr
        .create_room(&user(HOST, 0), settings(PatternType::Line, 10, 4))
        .await
        .unwrap();
    let first = mgr.join_room(&room.code, &user(ANA, 0), 2).await.unwrap();
    let again = mgr.join_room(&room.code, &user(ANA, 0), 5).await.unwrap();

    assert!(again.already_joined);
    assert_eq!(again.cards, first.cards);
    assert_eq!(again.room.total_pot, Amount(20));
    assert_eq!(coins(&wallet, ANA).await, 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_overfill() {
    let clock = clock();
    let players: Vec<UserId> = (10..20).map(UserId).collect();
    let wallet = funded_wallet(&clock, &players, 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let room = mgr
        .create_room(&user(HOST, 0), settings(PatternType::Line, 10, 3))
        .await
        .unwrap();

    let handles: Vec<_> = players
        .iter()
        .map(|&id| {
            let mgr = mgr.clone();
            let code = room.code.clone();
            tokio::spawn(async move { mgr.join_room(&code, &user(id, 0), 1).await })
        })
        .collect();

    let mut joined = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(RoomError::RoomFull(_)) => {}
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }
    assert_eq!(joined, 3);

    let view = mgr.room_details(&room.code).await.unwrap();
    assert_eq!(view.players.len(), 3);
    assert_eq!(view.total_pot, Amount(30));

    let mut spent = 0;
    for &id in &players {
        spent += 100 - coins(&wallet, id).await;
    }
    assert_eq!(spent, 30, "only seated players were charged");
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn test_admin_cancel_refunds_everyone_once() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let room = mgr
        .create_room(&user(HOST, 0), settings(PatternType::Line, 10, 4))
        .await
        .unwrap();
    mgr.join_room(&room.code, &user(ANA, 0), 3).await.unwrap();
    mgr.join_room(&room.code, &user(BOB, 0), 1).await.unwrap();

    let admin = Actor::admin(UserId(99));
    let outcome = mgr
        .cancel_room(&room.code, admin, CancelReason::AdminForced)
        .await
        .unwrap();
    let CancelOutcome::Cancelled { total_refunded, refunds, .. } = outcome else {
        panic!("room was live");
    };
    assert_eq!(total_refunded, Amount(40));
    assert_eq!(refunds.len(), 2);

    let again = mgr
        .cancel_room(&room.code, admin, CancelReason::AdminForced)
        .await
        .unwrap();
    assert!(matches!(
        again,
        CancelOutcome::AlreadyClosed { status: RoomStatus::Cancelled, .. }
    ));

    assert_eq!(coins(&wallet, ANA).await, 100);
    assert_eq!(coins(&wallet, BOB).await, 100);

    let view = mgr.room_details(&room.code).await.unwrap();
    assert_eq!(view.total_pot, Amount::ZERO);
    let records = mgr.refunds_for(view.id).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.reason == CancelReason::AdminForced));
}

#[tokio::test]
async fn test_host_closes_own_empty_room() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[], 0).await;
    let mgr = manager(wallet, &clock);
    let host = user(HOST, 0);

    let room = mgr
        .create_room(&host, settings(PatternType::Line, 10, 4))
        .await
        .unwrap();
    let outcome = mgr
        .cancel_room(&room.code, Actor::host(HOST), CancelReason::HostClosed)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        CancelOutcome::Cancelled { total_refunded: Amount::ZERO, .. }
    ));

    // A closed room no longer counts against the host's limit.
    assert!(mgr.create_room(&host, settings(PatternType::Line, 10, 4)).await.is_ok());
}

#[tokio::test]
async fn test_host_cannot_close_running_game() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA], 100).await;
    let mgr = manager(wallet, &clock);

    let code = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;
    assert!(matches!(
        mgr.cancel_room(&code, Actor::host(HOST), CancelReason::HostClosed).await,
        Err(RoomError::CloseDenied(_))
    ));
}

#[tokio::test]
async fn test_host_disconnect_cancels_manual_game_only() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let manual = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;
    let auto = running_room(&mgr, &user(UserId(50), 500), &[BOB], 10).await;

    assert!(mgr.host_disconnect_check(&manual, true).await.unwrap().is_none());
    assert!(mgr.host_disconnect_check(&auto, false).await.unwrap().is_none());

    let outcome = mgr.host_disconnect_check(&manual, false).await.unwrap();
    assert!(matches!(
        outcome,
        Some(CancelOutcome::Cancelled { reason: CancelReason::HostDisconnected, .. })
    ));
    assert_eq!(coins(&wallet, ANA).await, 100);
}

// =========================================================================
// Failure detector
// =========================================================================

#[tokio::test]
async fn test_quiet_auto_room_stalls_after_fifteen_minutes() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);
    let detector = FailureDetector::new(mgr.clone(), DetectorConfig::default());

    let code = running_room(&mgr, &user(HOST, 500), &[ANA, BOB], 10).await;

    clock.advance(minutes(14));
    let report = detector.sweep().await;
    assert_eq!(report.examined, 1);
    assert!(report.stalled.is_empty());

    clock.advance(minutes(2));
    let report = detector.sweep().await;
    assert_eq!(report.stalled.len(), 1);
    assert_eq!(report.stalled[0].reason, StallReason::Inactive);
    assert_eq!(report.stalled[0].total_refunded, Amount(20));

    let view = mgr.room_details(&code).await.unwrap();
    assert_eq!(view.status, RoomStatus::Cancelled);
    assert!(view.is_stalled);
    assert_eq!(coins(&wallet, ANA).await, 100);

    let stalled = detector.stalled_rooms().await;
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].refunded, Amount(20));

    // Already handled: the next sweep leaves it alone.
    assert_eq!(detector.sweep().await.examined, 0);
    assert!(mgr.audit_log().await.iter().any(|e| matches!(
        e.kind,
        AuditKind::RoomStalled { reason: StallReason::Inactive }
    )));
}

#[tokio::test]
async fn test_manual_room_with_absent_host_stalls_after_ten_minutes() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA], 100).await;
    let mgr = manager(wallet, &clock);
    let detector = FailureDetector::new(mgr.clone(), DetectorConfig::default());

    running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;

    clock.advance(minutes(9));
    assert!(detector.sweep().await.stalled.is_empty());

    clock.advance(minutes(2));
    let report = detector.sweep().await;
    assert_eq!(report.stalled.len(), 1);
    assert_eq!(report.stalled[0].reason, StallReason::HostAbsent);
}

#[tokio::test]
async fn test_activity_postpones_stall() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA], 100).await;
    let mgr = manager(wallet, &clock);
    let detector = FailureDetector::new(mgr.clone(), DetectorConfig::default());

    let code = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;
    clock.advance(minutes(8));
    mgr.call_number(&code, HOST, false).await.unwrap();
    clock.advance(minutes(8));

    assert!(detector.sweep().await.stalled.is_empty());
}

#[tokio::test]
async fn test_sweep_survives_wallet_failure_and_retries() {
    let clock = clock();
    let inner = MemoryWallet::with_clock(clock.clone());
    for id in [ANA, BOB] {
        inner.deposit(id, Currency::Coins, Amount(100)).await.unwrap();
    }
    let wallet = Arc::new(FlakyWallet::new(inner));
    let mgr = manager(wallet.clone(), &clock);
    let alerts = Arc::new(RecordingAlerts::default());
    let detector =
        FailureDetector::new(mgr.clone(), DetectorConfig::default()).with_alerts(alerts.clone());

    let broken = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;
    let healthy = running_room(&mgr, &user(UserId(60), 0), &[BOB], 10).await;

    wallet.break_for(ANA);
    clock.advance(minutes(20));
    let report = detector.sweep().await;
    assert_eq!(report.examined, 2);
    assert_eq!(report.stalled.len(), 1);
    assert_eq!(report.stalled[0].code, healthy);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, broken);

    let sent = alerts.taken();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].severity, Severity::Critical);
    assert_eq!(sent[0].room.as_ref(), Some(&broken));

    let view = mgr.room_details(&broken).await.unwrap();
    assert_eq!(view.status, RoomStatus::InProgress);
    assert!(!view.is_stalled);
    assert_eq!(view.total_pot, Amount(10));

    wallet.heal();
    let report = detector.sweep().await;
    assert_eq!(report.stalled.len(), 1);
    assert_eq!(report.stalled[0].code, broken);
    assert_eq!(wallet.balance(ANA, Currency::Coins).await.unwrap(), Amount(100));
}

#[tokio::test]
async fn test_restart_recovery_cancels_idle_and_keeps_recent() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA, BOB], 100).await;
    let mgr = manager(wallet.clone(), &clock);

    let idle = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;
    let recent = running_room(&mgr, &user(UserId(70), 500), &[BOB], 10).await;
    clock.advance(minutes(4));
    mgr.call_number(&recent, UserId(70), true).await.unwrap();
    clock.advance(minutes(2));

    // Simulate the restart: rebuild everything from the persisted store.
    let snapshot = mgr.store().snapshot().await;
    let restarted = Arc::new(
        RoomManager::new(wallet.clone())
            .with_clock(clock.clone())
            .with_store(Arc::new(RoomStore::from_snapshot(snapshot))),
    );
    let detector = FailureDetector::new(restarted.clone(), DetectorConfig::default());

    let report = detector.recover_after_restart().await;
    assert_eq!(report.cancelled, vec![idle.clone()]);
    assert_eq!(report.resumed, vec![recent.clone()]);

    let refunds = restarted
        .refunds_for(restarted.room_details(&idle).await.unwrap().id)
        .await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].reason, CancelReason::ServerRestart);
    assert_eq!(coins(&wallet, ANA).await, 100);

    let kept = restarted.room_details(&recent).await.unwrap();
    assert_eq!(kept.status, RoomStatus::InProgress);
    assert!(kept.players.iter().all(|p| !p.is_connected));
}

#[tokio::test]
async fn test_force_refund_requires_admin_role() {
    let clock = clock();
    let wallet = funded_wallet(&clock, &[ANA], 100).await;
    let mgr = manager(wallet.clone(), &clock);
    let detector = FailureDetector::new(mgr.clone(), DetectorConfig::default());

    let code = running_room(&mgr, &user(HOST, 0), &[ANA], 10).await;

    let err = detector
        .force_refund(&code, &user(ANA, 9_000))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::Forbidden(_)));
    assert_eq!(err.code(), 403);

    let admin = user(UserId(99), 0).with_role(ADMIN_ROLE);
    let outcome = detector.force_refund(&code, &admin).await.unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(coins(&wallet, ANA).await, 100);

    let refunds = mgr
        .refunds_for(mgr.room_details(&code).await.unwrap().id)
        .await;
    assert_eq!(refunds[0].actor_id, Some(UserId(99)));
    assert_eq!(refunds[0].reason, CancelReason::AdminForced);
}
