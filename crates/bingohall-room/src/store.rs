//! In-memory room storage with per-room row locks.
//!
//! Each [`GameRoom`] lives behind its own `tokio::sync::Mutex`. Holding
//! that guard is the room's exclusive row lock: every mutating operation
//! takes it for its whole duration, including the wallet call, so two
//! operations on one room are strictly ordered while different rooms
//! proceed independently. The index that maps codes to rooms sits behind
//! an `RwLock` and is only held long enough to clone out an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bingohall_protocol::{CardId, RoomCode, RoomId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::{AuditEntry, GameRoom, PlayerStats, RefundRecord};

/// Shared handle to one locked room.
pub type RoomRef = Arc<Mutex<GameRoom>>;

#[derive(Default)]
struct Index {
    by_id: HashMap<RoomId, RoomRef>,
    by_code: HashMap<RoomCode, RoomId>,
}

/// Serializable contents of a [`RoomStore`], written on shutdown and read
/// back on startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub rooms: Vec<GameRoom>,
    pub refunds: Vec<RefundRecord>,
    pub audit: Vec<AuditEntry>,
    pub stats: Vec<PlayerStats>,
    pub next_room_id: u64,
    pub next_card_id: u64,
}

pub struct RoomStore {
    index: RwLock<Index>,
    refunds: Mutex<Vec<RefundRecord>>,
    audit: Mutex<Vec<AuditEntry>>,
    stats: Mutex<HashMap<UserId, PlayerStats>>,
    next_room_id: AtomicU64,
    next_card_id: AtomicU64,
    next_refund_id: AtomicU64,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            refunds: Mutex::new(Vec::new()),
            audit: Mutex::new(Vec::new()),
            stats: Mutex::new(HashMap::new()),
            next_room_id: AtomicU64::new(1),
            next_card_id: AtomicU64::new(1),
            next_refund_id: AtomicU64::new(1),
        }
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut index = Index::default();
        let mut max_room = 0;
        let mut max_card = 0;
        for room in snapshot.rooms {
            max_room = max_room.max(room.id.0);
            max_card = room.cards.iter().map(|c| c.id.0).fold(max_card, u64::max);
            index.by_code.insert(room.code.clone(), room.id);
            index.by_id.insert(room.id, Arc::new(Mutex::new(room)));
        }
        let stats = snapshot
            .stats
            .into_iter()
            .map(|s| (s.user_id, s))
            .collect();
        let next_refund = snapshot.refunds.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        Self {
            index: RwLock::new(index),
            refunds: Mutex::new(snapshot.refunds),
            audit: Mutex::new(snapshot.audit),
            stats: Mutex::new(stats),
            next_room_id: AtomicU64::new(snapshot.next_room_id.max(max_room + 1)),
            next_card_id: AtomicU64::new(snapshot.next_card_id.max(max_card + 1)),
            next_refund_id: AtomicU64::new(next_refund),
        }
    }

    pub fn next_room_id(&self) -> RoomId {
        RoomId(self.next_room_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_card_id(&self) -> CardId {
        CardId(self.next_card_id.fetch_add(1, Ordering::Relaxed))
    }

    // -- Rooms -------------------------------------------------------------

    /// Adds a room. Returns `false` (and stores nothing) if its code is
    /// already taken.
    pub async fn insert(&self, room: GameRoom) -> bool {
        let mut index = self.index.write().await;
        if index.by_code.contains_key(&room.code) {
            return false;
        }
        index.by_code.insert(room.code.clone(), room.id);
        index.by_id.insert(room.id, Arc::new(Mutex::new(room)));
        true
    }

    pub async fn contains_code(&self, code: &RoomCode) -> bool {
        self.index.read().await.by_code.contains_key(code)
    }

    pub async fn get(&self, code: &RoomCode) -> Option<RoomRef> {
        let index = self.index.read().await;
        let id = index.by_code.get(code)?;
        index.by_id.get(id).cloned()
    }

    pub async fn get_by_id(&self, id: RoomId) -> Option<RoomRef> {
        self.index.read().await.by_id.get(&id).cloned()
    }

    /// Every room, in creation order.
    pub async fn all(&self) -> Vec<RoomRef> {
        let index = self.index.read().await;
        let mut ids: Vec<&RoomId> = index.by_id.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // -- Records -----------------------------------------------------------

    pub async fn record_refunds(&self, records: Vec<RefundRecord>) {
        self.refunds.lock().await.extend(records);
    }

    pub async fn refunds_for(&self, room_id: RoomId) -> Vec<RefundRecord> {
        self.refunds
            .lock()
            .await
            .iter()
            .filter(|r| r.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn next_refund_id(&self) -> u64 {
        self.next_refund_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn append_audit(&self, entry: AuditEntry) {
        self.audit.lock().await.push(entry);
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().await.clone()
    }

    /// Applies `update` to a user's stats, creating them on first use.
    pub async fn update_stats(&self, user_id: UserId, update: impl FnOnce(&mut PlayerStats)) {
        let mut stats = self.stats.lock().await;
        update(
            stats
                .entry(user_id)
                .or_insert_with(|| PlayerStats::new(user_id)),
        );
    }

    pub async fn stats(&self, user_id: UserId) -> PlayerStats {
        self.stats
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| PlayerStats::new(user_id))
    }

    // -- Snapshot ----------------------------------------------------------

    /// Copies out everything. Locks each room in turn, so the result is
    /// consistent per room.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let mut rooms = Vec::new();
        for room in self.all().await {
            rooms.push(room.lock().await.clone());
        }
        let mut stats: Vec<PlayerStats> = self.stats.lock().await.values().cloned().collect();
        stats.sort_by_key(|s| s.user_id);
        StoreSnapshot {
            rooms,
            refunds: self.refunds.lock().await.clone(),
            audit: self.audit.lock().await.clone(),
            stats,
            next_room_id: self.next_room_id.load(Ordering::Relaxed),
            next_card_id: self.next_card_id.load(Ordering::Relaxed),
        }
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}
