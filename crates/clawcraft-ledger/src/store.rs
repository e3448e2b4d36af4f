//! Wallet storage and the append-only transaction journal.
//!
//! Each wallet sits behind its own [`Mutex`] so transfers touching
//! different wallets never contend. The map of wallet slots is only
//! write-locked to open a new slot. A slot may be empty (`None`): the
//! transfer engine opens slots for credit targets before locking them, and
//! the wallet only materialises when the transfer commits, so a failed
//! transfer never leaves an observable wallet behind.
//!
//! Lock order is always: wallet slots in ascending [`AgentId`] order, then
//! the journal.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clawcraft_types::{AgentId, EconomyStats, Transaction, Wallet, WalletSummary};

use crate::transaction::TransactionBuilder;
use crate::{LedgerError, add};

/// A lockable wallet cell; `None` until the first committed credit.
pub(crate) type WalletSlot = Arc<Mutex<Option<Wallet>>>;

/// Window used for the rolling volume statistic.
const VOLUME_WINDOW_HOURS: i64 = 24;

/// A consistent copy of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomySnapshot {
    /// Every materialised wallet, ordered by agent id.
    pub wallets: Vec<Wallet>,
    /// The full journal in block order.
    pub transactions: Vec<Transaction>,
    /// Block height of the last confirmed transaction (0 when empty).
    pub block_height: u64,
}

#[derive(Debug, Default)]
struct Journal {
    transactions: Vec<Transaction>,
    block_height: u64,
}

/// In-memory ledger: wallets plus the confirmed-transaction journal.
///
/// Reads are side-effect free. All mutation goes through
/// [`TransferEngine`](crate::TransferEngine).
///
/// The journal is unbounded and holds every confirmed transaction; the
/// conservation audit replays all of it.
#[derive(Debug, Default)]
pub struct LedgerStore {
    wallets: RwLock<BTreeMap<AgentId, WalletSlot>>,
    journal: Mutex<Journal>,
}

impl LedgerStore {
    /// An empty ledger at block height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from a snapshot.
    ///
    /// The snapshot is trusted as-is; run
    /// [`verify_conservation`](crate::verify_conservation) on it first when
    /// it comes from outside the process.
    pub fn restore(snapshot: EconomySnapshot) -> Self {
        let wallets = snapshot
            .wallets
            .into_iter()
            .filter(|w| !w.agent_id.is_system())
            .map(|w| (w.agent_id.clone(), Arc::new(Mutex::new(Some(w)))))
            .collect();
        Self {
            wallets: RwLock::new(wallets),
            journal: Mutex::new(Journal {
                transactions: snapshot.transactions,
                block_height: snapshot.block_height,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Look up one wallet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn wallet(&self, agent: &AgentId) -> Result<Option<Wallet>, LedgerError> {
        let Some(slot) = self.existing_slot(agent)? else {
            return Ok(None);
        };
        Ok(lock(&slot, "wallet")?.clone())
    }

    /// Spendable balance of `agent`, zero when it has no wallet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn balance(&self, agent: &AgentId) -> Result<Decimal, LedgerError> {
        Ok(self
            .wallet(agent)?
            .map_or(Decimal::ZERO, |wallet| wallet.balance))
    }

    /// Every materialised wallet, ordered by agent id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let mut wallets = Vec::new();
        for slot in self.slots()? {
            if let Some(wallet) = lock(&slot, "wallet")?.as_ref() {
                wallets.push(wallet.clone());
            }
        }
        Ok(wallets)
    }

    /// A copy of the full journal in block order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(lock(&self.journal, "journal")?.transactions.clone())
    }

    /// The newest `limit` transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, LedgerError> {
        let journal = lock(&self.journal, "journal")?;
        Ok(journal
            .transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    /// Number of confirmed transactions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn transaction_count(&self) -> Result<u64, LedgerError> {
        let journal = lock(&self.journal, "journal")?;
        Ok(u64::try_from(journal.transactions.len()).unwrap_or(u64::MAX))
    }

    /// Block height of the last confirmed transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(lock(&self.journal, "journal")?.block_height)
    }

    /// A consistent copy of wallets and journal.
    ///
    /// Locks every wallet in id order and then the journal, so no transfer
    /// can be half-visible in the result.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn snapshot(&self) -> Result<EconomySnapshot, LedgerError> {
        let slots = self.slots()?;
        let mut guards = Vec::with_capacity(slots.len());
        for slot in &slots {
            guards.push(lock(slot, "wallet")?);
        }
        let journal = lock(&self.journal, "journal")?;
        Ok(EconomySnapshot {
            wallets: guards.iter().filter_map(|g| g.as_ref().cloned()).collect(),
            transactions: journal.transactions.clone(),
            block_height: journal.block_height,
        })
    }

    /// Dashboard statistics as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked, or
    /// [`LedgerError::ArithmeticOverflow`] if a sum overflows.
    pub fn stats(
        &self,
        now: DateTime<Utc>,
        top_n: usize,
        contraband_items: u32,
    ) -> Result<EconomyStats, LedgerError> {
        let snapshot = self.snapshot()?;

        let mut total_supply = Decimal::ZERO;
        for wallet in &snapshot.wallets {
            let holdings = wallet.holdings().ok_or(LedgerError::ArithmeticOverflow)?;
            total_supply = add(total_supply, holdings)?;
        }

        let window_start = now
            .checked_sub_signed(Duration::hours(VOLUME_WINDOW_HOURS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut volume_24h = Decimal::ZERO;
        for tx in snapshot
            .transactions
            .iter()
            .filter(|tx| tx.timestamp > window_start)
        {
            volume_24h = add(volume_24h, tx.amount)?;
        }

        let mut ranked: Vec<&Wallet> = snapshot.wallets.iter().collect();
        ranked.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        let top_wallets = ranked
            .into_iter()
            .take(top_n)
            .map(|w| WalletSummary {
                agent_id: w.agent_id.clone(),
                balance: w.balance,
            })
            .collect();

        Ok(EconomyStats {
            total_supply,
            total_transactions: u64::try_from(snapshot.transactions.len()).unwrap_or(u64::MAX),
            volume_24h,
            top_wallets,
            wallet_count: u64::try_from(snapshot.wallets.len()).unwrap_or(u64::MAX),
            block_height: snapshot.block_height,
            contraband_items,
        })
    }

    // -----------------------------------------------------------------------
    // Engine internals
    // -----------------------------------------------------------------------

    /// The slot for `agent`, if one was ever opened.
    pub(crate) fn existing_slot(&self, agent: &AgentId) -> Result<Option<WalletSlot>, LedgerError> {
        let Ok(map) = self.wallets.read() else {
            return Err(LedgerError::LockPoisoned("wallet map"));
        };
        Ok(map.get(agent).cloned())
    }

    /// The slot for `agent`, opening an empty one if needed.
    pub(crate) fn slot_or_insert(&self, agent: &AgentId) -> Result<WalletSlot, LedgerError> {
        if let Some(slot) = self.existing_slot(agent)? {
            return Ok(slot);
        }
        let Ok(mut map) = self.wallets.write() else {
            return Err(LedgerError::LockPoisoned("wallet map"));
        };
        Ok(Arc::clone(
            map.entry(agent.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        ))
    }

    /// Stamp and append a batch of transactions as one unit.
    ///
    /// Either every builder validates and the whole batch is appended with
    /// consecutive block heights, or nothing is appended.
    pub(crate) fn append(
        &self,
        builders: Vec<TransactionBuilder>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut journal = lock(&self.journal, "journal")?;
        let mut height = journal.block_height;
        let mut confirmed = Vec::with_capacity(builders.len());
        for builder in builders {
            height = height
                .checked_add(1)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            confirmed.push(builder.build(height, now)?);
        }
        journal.transactions.extend(confirmed.iter().cloned());
        journal.block_height = height;
        Ok(confirmed)
    }

    fn slots(&self) -> Result<Vec<WalletSlot>, LedgerError> {
        let Ok(map) = self.wallets.read() else {
            return Err(LedgerError::LockPoisoned("wallet map"));
        };
        Ok(map.values().cloned().collect())
    }
}

/// Lock a mutex, mapping poisoning to [`LedgerError::LockPoisoned`].
pub(crate) fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    what: &'static str,
) -> Result<MutexGuard<'a, T>, LedgerError> {
    let Ok(guard) = mutex.lock() else {
        return Err(LedgerError::LockPoisoned(what));
    };
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn wallet(agent: &str, balance: i64) -> Wallet {
        let mut wallet = Wallet::empty(AgentId::from(agent), Utc::now());
        wallet.balance = Decimal::new(balance, 0);
        wallet
    }

    #[test]
    fn new_store_is_empty() {
        let store = LedgerStore::new();
        assert_eq!(store.wallets().ok().map(|w| w.len()), Some(0));
        assert_eq!(store.block_height().ok(), Some(0));
        assert_eq!(store.wallet(&AgentId::from("alice")).ok(), Some(None));
    }

    #[test]
    fn empty_slots_are_invisible() {
        let store = LedgerStore::new();
        let _ = store.slot_or_insert(&AgentId::from("ghost"));
        assert_eq!(store.wallets().ok().map(|w| w.len()), Some(0));
        assert_eq!(store.snapshot().ok().map(|s| s.wallets.len()), Some(0));
    }

    #[test]
    fn restore_round_trips_snapshot() {
        let snapshot = EconomySnapshot {
            wallets: vec![wallet("alice", 80), wallet("bob", 120)],
            transactions: Vec::new(),
            block_height: 2,
        };
        let store = LedgerStore::restore(snapshot.clone());
        assert_eq!(store.snapshot().ok(), Some(snapshot));
        assert_eq!(store.balance(&AgentId::from("bob")).ok(), Some(Decimal::new(120, 0)));
    }

    #[test]
    fn append_assigns_consecutive_heights() {
        let store = LedgerStore::new();
        let now = Utc::now();
        let builder = |amount| {
            TransactionBuilder::new(clawcraft_types::TransactionReason::Mining)
                .from(AgentId::system())
                .to(AgentId::from("alice"))
                .amount(Decimal::new(amount, 0))
        };
        let first = store.append(vec![builder(5), builder(3)], now).ok();
        let heights: Option<Vec<u64>> =
            first.map(|txs| txs.iter().map(|t| t.block_height).collect());
        assert_eq!(heights, Some(vec![1, 2]));
        assert_eq!(store.block_height().ok(), Some(2));
    }

    #[test]
    fn append_is_all_or_nothing() {
        let store = LedgerStore::new();
        let good = TransactionBuilder::new(clawcraft_types::TransactionReason::Mining)
            .from(AgentId::system())
            .to(AgentId::from("alice"))
            .amount(Decimal::ONE);
        let bad = TransactionBuilder::new(clawcraft_types::TransactionReason::Mining)
            .from(AgentId::system())
            .to(AgentId::from("alice"))
            .amount(Decimal::ZERO);
        assert!(store.append(vec![good, bad], Utc::now()).is_err());
        assert_eq!(store.transaction_count().ok(), Some(0));
        assert_eq!(store.block_height().ok(), Some(0));
    }

    #[test]
    fn stats_window_and_leaderboard() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 12, 0, 0).single().unwrap_or_default();
        let old = now - Duration::hours(30);
        let recent = now - Duration::hours(1);
        let tx = |amount, timestamp, block_height| Transaction {
            id: clawcraft_types::TransactionId::new(),
            from: AgentId::system(),
            to: AgentId::from("alice"),
            amount: Decimal::new(amount, 0),
            reason: clawcraft_types::TransactionReason::Manual,
            timestamp,
            block_height,
            confirmed: true,
        };
        let store = LedgerStore::restore(EconomySnapshot {
            wallets: vec![wallet("alice", 50), wallet("bob", 70), wallet("carol", 70)],
            transactions: vec![tx(100, old, 1), tx(40, recent, 2)],
            block_height: 2,
        });

        let stats = store.stats(now, 2, 5).ok();
        assert_eq!(stats.as_ref().map(|s| s.total_supply), Some(Decimal::new(190, 0)));
        assert_eq!(stats.as_ref().map(|s| s.volume_24h), Some(Decimal::new(40, 0)));
        assert_eq!(stats.as_ref().map(|s| s.total_transactions), Some(2));
        let top: Option<Vec<String>> = stats.map(|s| {
            s.top_wallets
                .into_iter()
                .map(|w| w.agent_id.to_string())
                .collect()
        });
        assert_eq!(top, Some(vec!["bob".to_owned(), "carol".to_owned()]));
    }
}
