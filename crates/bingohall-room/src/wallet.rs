//! The wallet abstraction the engine moves money through.
//!
//! Balances live outside the hall. The engine only needs two things: a
//! balance read, and a batch of postings applied atomically together with
//! their ledger rows. [`MemoryWallet`] is the in-process implementation
//! used by the demo server and the tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bingohall_protocol::{Amount, Currency, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Clock, SystemClock, WalletError};

// ---------------------------------------------------------------------------
// Postings and ledger rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

/// Why money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Memo {
    CardPurchase,
    Refund,
    WinnerPrize,
    HostPrize,
    Deposit,
}

/// One requested balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub user_id: UserId,
    pub currency: Currency,
    pub direction: Direction,
    pub amount: Amount,
    pub memo: Memo,
    pub room_id: Option<RoomId>,
}

impl Posting {
    pub fn debit(user_id: UserId, currency: Currency, amount: Amount, memo: Memo) -> Self {
        Self {
            user_id,
            currency,
            direction: Direction::Debit,
            amount,
            memo,
            room_id: None,
        }
    }

    pub fn credit(user_id: UserId, currency: Currency, amount: Amount, memo: Memo) -> Self {
        Self {
            user_id,
            currency,
            direction: Direction::Credit,
            amount,
            memo,
            room_id: None,
        }
    }

    pub fn for_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }
}

/// A posting as applied, with the balance it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: UserId,
    pub currency: Currency,
    pub direction: Direction,
    pub amount: Amount,
    pub balance_after: Amount,
    pub memo: Memo,
    pub room_id: Option<RoomId>,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wallet trait
// ---------------------------------------------------------------------------

/// Balance storage keyed by user and currency.
///
/// `apply` is all-or-nothing: either every posting lands with its ledger
/// row, or none does and the balances are untouched.
pub trait Wallet: Send + Sync + 'static {
    fn balance(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> impl Future<Output = Result<Amount, WalletError>> + Send;

    fn apply(
        &self,
        postings: Vec<Posting>,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, WalletError>> + Send;
}

impl<W: Wallet> Wallet for Arc<W> {
    fn balance(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> impl Future<Output = Result<Amount, WalletError>> + Send {
        (**self).balance(user_id, currency)
    }

    fn apply(
        &self,
        postings: Vec<Posting>,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, WalletError>> + Send {
        (**self).apply(postings)
    }
}

// ---------------------------------------------------------------------------
// MemoryWallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub user_id: UserId,
    pub currency: Currency,
    pub amount: Amount,
}

/// Serializable state of a [`MemoryWallet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balances: Vec<BalanceRow>,
    pub ledger: Vec<LedgerEntry>,
}

#[derive(Default)]
struct Accounts {
    balances: HashMap<(UserId, Currency), Amount>,
    ledger: Vec<LedgerEntry>,
}

/// An in-process wallet. One lock covers balances and ledger together.
pub struct MemoryWallet {
    accounts: Mutex<Accounts>,
    clock: Arc<dyn Clock>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Mutex::new(Accounts::default()),
            clock,
        }
    }

    pub fn from_snapshot(snapshot: WalletSnapshot, clock: Arc<dyn Clock>) -> Self {
        let balances = snapshot
            .balances
            .into_iter()
            .map(|row| ((row.user_id, row.currency), row.amount))
            .collect();
        Self {
            accounts: Mutex::new(Accounts {
                balances,
                ledger: snapshot.ledger,
            }),
            clock,
        }
    }

    /// Tops up a balance, recorded as a `Deposit` ledger row.
    pub async fn deposit(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Amount, WalletError> {
        let entries = self
            .apply(vec![Posting::credit(user_id, currency, amount, Memo::Deposit)])
            .await?;
        Ok(entries
            .last()
            .map(|e| e.balance_after)
            .unwrap_or(Amount::ZERO))
    }

    pub async fn ledger(&self) -> Vec<LedgerEntry> {
        self.accounts.lock().await.ledger.clone()
    }

    pub async fn ledger_for(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.accounts
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> WalletSnapshot {
        let accounts = self.accounts.lock().await;
        let mut balances: Vec<BalanceRow> = accounts
            .balances
            .iter()
            .map(|(&(user_id, currency), &amount)| BalanceRow {
                user_id,
                currency,
                amount,
            })
            .collect();
        balances.sort_by_key(|row| (row.user_id, row.currency));
        WalletSnapshot {
            balances,
            ledger: accounts.ledger.clone(),
        }
    }
}

impl Default for MemoryWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet for MemoryWallet {
    async fn balance(&self, user_id: UserId, currency: Currency) -> Result<Amount, WalletError> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .balances
            .get(&(user_id, currency))
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    async fn apply(&self, postings: Vec<Posting>) -> Result<Vec<LedgerEntry>, WalletError> {
        let mut accounts = self.accounts.lock().await;
        let at = self.clock.now();

        // Stage every change first so a failing posting leaves nothing behind.
        let mut staged: HashMap<(UserId, Currency), Amount> = HashMap::new();
        let mut after = Vec::with_capacity(postings.len());
        for posting in &postings {
            let key = (posting.user_id, posting.currency);
            let current = staged
                .get(&key)
                .or_else(|| accounts.balances.get(&key))
                .copied()
                .unwrap_or(Amount::ZERO);
            let next = match posting.direction {
                Direction::Debit => current.checked_sub(posting.amount).ok_or(
                    WalletError::InsufficientFunds {
                        user_id: posting.user_id,
                        currency: posting.currency,
                        needed: posting.amount,
                        available: current,
                    },
                )?,
                Direction::Credit => current
                    .checked_add(posting.amount)
                    .ok_or(WalletError::Overflow(posting.user_id))?,
            };
            staged.insert(key, next);
            after.push(next);
        }

        let first_id = accounts.ledger.len() as u64 + 1;
        let entries: Vec<LedgerEntry> = postings
            .into_iter()
            .zip(after)
            .enumerate()
            .map(|(i, (posting, balance_after))| LedgerEntry {
                id: first_id + i as u64,
                user_id: posting.user_id,
                currency: posting.currency,
                direction: posting.direction,
                amount: posting.amount,
                balance_after,
                memo: posting.memo,
                room_id: posting.room_id,
                at,
            })
            .collect();

        accounts.balances.extend(staged);
        accounts.ledger.extend(entries.iter().cloned());
        Ok(entries)
    }
}
