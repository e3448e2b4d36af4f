//! The transfer engine: the only code path that changes balances.
//!
//! # Atomicity
//!
//! A call locks every non-system wallet it touches, in ascending
//! [`AgentId`] order, validates all legs against staged copies, appends the
//! journal entries, and only then writes the staged wallets back. Any error
//! before the write-back leaves wallets and journal exactly as they were.
//! Two concurrent debits of the same wallet therefore serialize, and the
//! second one sees the first one's result.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use clawcraft_types::{AgentId, Clock, Transaction, TransactionReason, Wallet};

use crate::store::{LedgerStore, WalletSlot, lock};
use crate::transaction::{TransactionBuilder, validate};
use crate::{LedgerError, add, sub};

/// Which pool of a wallet a debit draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FundSource {
    /// The spendable balance.
    #[default]
    Available,
    /// Funds previously moved to escrow.
    Escrow,
}

/// One leg of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Debited account.
    pub from: AgentId,
    /// Credited account.
    pub to: AgentId,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Journal reason.
    pub reason: TransactionReason,
    /// Pool the debit draws from.
    pub source: FundSource,
}

impl TransferRequest {
    /// A transfer between two accounts.
    pub const fn new(from: AgentId, to: AgentId, amount: Decimal, reason: TransactionReason) -> Self {
        Self {
            from,
            to,
            amount,
            reason,
            source: FundSource::Available,
        }
    }

    /// Coins minted by the system for `to`.
    pub fn reward(to: AgentId, amount: Decimal, reason: TransactionReason) -> Self {
        Self::new(AgentId::system(), to, amount, reason)
    }

    /// Coins paid by `from` to the system.
    pub fn penalty(from: AgentId, amount: Decimal, reason: TransactionReason) -> Self {
        Self::new(from, AgentId::system(), amount, reason)
    }

    /// Draw the debit from escrow instead of the spendable balance.
    #[must_use]
    pub const fn from_escrow(mut self) -> Self {
        self.source = FundSource::Escrow;
        self
    }
}

type Guards<'a> = BTreeMap<AgentId, MutexGuard<'a, Option<Wallet>>>;

/// Executes transfers against a shared [`LedgerStore`].
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl TransferEngine {
    /// Create an engine over `store`, timestamping with `clock`.
    pub fn new(store: Arc<LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store, for reads.
    pub const fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Current block height.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockPoisoned`] if a writer panicked.
    pub fn block_height(&self) -> Result<u64, LedgerError> {
        self.store.block_height()
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// A missing credit wallet is created; a missing debit wallet is an
    /// error. The system account is never debited or credited in storage.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for a non-positive amount.
    /// - [`LedgerError::SelfTransfer`] when `from == to`.
    /// - [`LedgerError::UnknownWallet`] when `from` has no wallet.
    /// - [`LedgerError::InsufficientFunds`] when `from` cannot cover it.
    pub fn transfer(
        &self,
        from: &AgentId,
        to: &AgentId,
        amount: Decimal,
        reason: TransactionReason,
    ) -> Result<Transaction, LedgerError> {
        self.execute(&TransferRequest::new(from.clone(), to.clone(), amount, reason))
    }

    /// Execute a single request.
    ///
    /// # Errors
    ///
    /// Same as [`TransferEngine::transfer`].
    pub fn execute(&self, request: &TransferRequest) -> Result<Transaction, LedgerError> {
        self.execute_all(core::slice::from_ref(request))?
            .into_iter()
            .next()
            .ok_or(LedgerError::MissingField("transaction"))
    }

    /// Execute several legs as one atomic unit.
    ///
    /// Legs apply in order against the same staged wallets, so a later leg
    /// sees the effect of an earlier one. Either every leg commits (one
    /// journal entry each, consecutive block heights) or none does.
    ///
    /// # Errors
    ///
    /// Same as [`TransferEngine::transfer`], for the first failing leg.
    pub fn execute_all(&self, legs: &[TransferRequest]) -> Result<Vec<Transaction>, LedgerError> {
        if legs.is_empty() {
            return Ok(Vec::new());
        }
        let slots = self.resolve_slots(legs)?;
        let mut guards: Guards<'_> = BTreeMap::new();
        for (agent, slot) in &slots {
            guards.insert(agent.clone(), lock(slot, "wallet")?);
        }
        self.commit(&mut guards, legs)
    }

    /// Open a wallet for `agent`, granting `starting_balance` from the
    /// system as a [`TransactionReason::Manual`] transaction.
    ///
    /// Idempotent: an existing wallet is returned unchanged and no grant is
    /// made, even when two callers race to create the same wallet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SelfTransfer`] for the system account.
    /// - [`LedgerError::InvalidAmount`] for a negative starting balance.
    pub fn create_wallet(
        &self,
        agent: &AgentId,
        starting_balance: Decimal,
    ) -> Result<Wallet, LedgerError> {
        if agent.is_system() {
            return Err(LedgerError::SelfTransfer(agent.clone()));
        }
        if starting_balance.is_sign_negative() {
            return Err(LedgerError::InvalidAmount {
                amount: starting_balance,
            });
        }

        let slot = self.store.slot_or_insert(agent)?;
        let mut guard = lock(&slot, "wallet")?;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        if starting_balance.is_zero() {
            let wallet = Wallet::empty(agent.clone(), self.clock.now());
            *guard = Some(wallet.clone());
            tracing::debug!(agent = %agent, "wallet opened");
            return Ok(wallet);
        }

        let grant = TransferRequest::reward(agent.clone(), starting_balance, TransactionReason::Manual);
        let mut guards: Guards<'_> = BTreeMap::new();
        guards.insert(agent.clone(), guard);
        self.commit(&mut guards, core::slice::from_ref(&grant))?;
        tracing::debug!(agent = %agent, balance = %starting_balance, "wallet opened with grant");
        guards
            .get(agent)
            .and_then(|g| g.as_ref().cloned())
            .ok_or_else(|| LedgerError::UnknownWallet(agent.clone()))
    }

    /// Move `amount` from spendable balance into escrow.
    ///
    /// Escrow moves stay inside one wallet, so they do not produce journal
    /// entries and do not change supply.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`], [`LedgerError::UnknownWallet`] or
    /// [`LedgerError::InsufficientFunds`].
    pub fn escrow(&self, agent: &AgentId, amount: Decimal) -> Result<Wallet, LedgerError> {
        self.shift(agent, amount, FundSource::Available)
    }

    /// Return `amount` from escrow to the spendable balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`], [`LedgerError::UnknownWallet`] or
    /// [`LedgerError::InsufficientFunds`] if less than `amount` is escrowed.
    pub fn release_escrow(&self, agent: &AgentId, amount: Decimal) -> Result<Wallet, LedgerError> {
        self.shift(agent, amount, FundSource::Escrow)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Find or open the slot of every non-system participant, in id order.
    fn resolve_slots(
        &self,
        legs: &[TransferRequest],
    ) -> Result<Vec<(AgentId, WalletSlot)>, LedgerError> {
        let mut debited = BTreeSet::new();
        let mut participants = BTreeSet::new();
        for leg in legs {
            validate(&leg.from, &leg.to, leg.amount)?;
            if !leg.from.is_system() {
                debited.insert(&leg.from);
                participants.insert(&leg.from);
            }
            if !leg.to.is_system() {
                participants.insert(&leg.to);
            }
        }

        let mut slots = Vec::with_capacity(participants.len());
        for agent in participants {
            let slot = if debited.contains(agent) {
                self.store
                    .existing_slot(agent)?
                    .ok_or_else(|| LedgerError::UnknownWallet(agent.clone()))?
            } else {
                self.store.slot_or_insert(agent)?
            };
            slots.push((agent.clone(), slot));
        }
        Ok(slots)
    }

    /// Apply `legs` to locked wallets. Nothing is written back on error.
    fn commit(
        &self,
        guards: &mut Guards<'_>,
        legs: &[TransferRequest],
    ) -> Result<Vec<Transaction>, LedgerError> {
        let now = self.clock.now();

        let mut present: BTreeSet<AgentId> = BTreeSet::new();
        let mut staged: BTreeMap<AgentId, Wallet> = BTreeMap::new();
        for (agent, guard) in guards.iter() {
            if guard.is_some() {
                present.insert(agent.clone());
            }
            let wallet = (**guard)
                .clone()
                .unwrap_or_else(|| Wallet::empty(agent.clone(), now));
            staged.insert(agent.clone(), wallet);
        }

        let mut builders = Vec::with_capacity(legs.len());
        for leg in legs {
            if !leg.from.is_system() {
                let wallet = staged
                    .get_mut(&leg.from)
                    .filter(|_| present.contains(&leg.from))
                    .ok_or_else(|| LedgerError::UnknownWallet(leg.from.clone()))?;
                debit(wallet, leg.amount, leg.source, now)?;
            }
            if !leg.to.is_system() {
                let wallet = staged
                    .get_mut(&leg.to)
                    .ok_or_else(|| LedgerError::UnknownWallet(leg.to.clone()))?;
                credit(wallet, leg.amount, now)?;
                present.insert(leg.to.clone());
            }
            builders.push(
                TransactionBuilder::new(leg.reason)
                    .from(leg.from.clone())
                    .to(leg.to.clone())
                    .amount(leg.amount),
            );
        }

        let confirmed = self.store.append(builders, now)?;

        for (agent, wallet) in staged {
            if let Some(guard) = guards.get_mut(&agent) {
                **guard = Some(wallet);
            }
        }

        for tx in &confirmed {
            tracing::debug!(
                from = %tx.from,
                to = %tx.to,
                amount = %tx.amount,
                reason = %tx.reason,
                block_height = tx.block_height,
                "transfer confirmed"
            );
        }
        Ok(confirmed)
    }

    /// Move funds between the two pools of one wallet.
    fn shift(&self, agent: &AgentId, amount: Decimal, from: FundSource) -> Result<Wallet, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let slot = self
            .store
            .existing_slot(agent)?
            .ok_or_else(|| LedgerError::UnknownWallet(agent.clone()))?;
        let mut guard = lock(&slot, "wallet")?;
        let mut wallet = guard
            .clone()
            .ok_or_else(|| LedgerError::UnknownWallet(agent.clone()))?;

        let (source, target) = match from {
            FundSource::Available => (wallet.balance, wallet.locked_balance),
            FundSource::Escrow => (wallet.locked_balance, wallet.balance),
        };
        if source < amount {
            return Err(LedgerError::InsufficientFunds {
                agent: agent.clone(),
                available: source,
                requested: amount,
            });
        }
        let source = sub(source, amount)?;
        let target = add(target, amount)?;
        match from {
            FundSource::Available => {
                wallet.balance = source;
                wallet.locked_balance = target;
            }
            FundSource::Escrow => {
                wallet.locked_balance = source;
                wallet.balance = target;
            }
        }
        wallet.last_activity = self.clock.now();

        *guard = Some(wallet.clone());
        tracing::debug!(agent = %agent, amount = %amount, direction = ?from, "escrow moved");
        Ok(wallet)
    }
}

fn debit(
    wallet: &mut Wallet,
    amount: Decimal,
    source: FundSource,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let pool = match source {
        FundSource::Available => &mut wallet.balance,
        FundSource::Escrow => &mut wallet.locked_balance,
    };
    if *pool < amount {
        return Err(LedgerError::InsufficientFunds {
            agent: wallet.agent_id.clone(),
            available: *pool,
            requested: amount,
        });
    }
    *pool = sub(*pool, amount)?;
    wallet.total_spent = add(wallet.total_spent, amount)?;
    touch(wallet, now)
}

fn credit(wallet: &mut Wallet, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
    wallet.balance = add(wallet.balance, amount)?;
    wallet.total_earned = add(wallet.total_earned, amount)?;
    touch(wallet, now)
}

fn touch(wallet: &mut Wallet, now: DateTime<Utc>) -> Result<(), LedgerError> {
    wallet.transaction_count = wallet
        .transaction_count
        .checked_add(1)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    wallet.last_activity = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use clawcraft_types::SystemClock;

    use super::*;
    use crate::{ConservationResult, verify_conservation};

    fn engine() -> TransferEngine {
        TransferEngine::new(Arc::new(LedgerStore::new()), Arc::new(SystemClock))
    }

    fn agent(name: &str) -> AgentId {
        AgentId::from(name)
    }

    fn coins(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn balance(engine: &TransferEngine, name: &str) -> Option<Decimal> {
        engine.store().balance(&agent(name)).ok()
    }

    /// alice and bob both start at 100.
    fn alice_and_bob() -> TransferEngine {
        let engine = engine();
        let _ = engine.create_wallet(&agent("alice"), coins(100));
        let _ = engine.create_wallet(&agent("bob"), coins(100));
        engine
    }

    #[test]
    fn trades_move_balances_and_preserve_supply() {
        let engine = alice_and_bob();
        let before = engine.store().transaction_count().ok();

        let first = engine.transfer(&agent("alice"), &agent("bob"), coins(30), TransactionReason::Trade);
        let second = engine.transfer(&agent("bob"), &agent("alice"), coins(10), TransactionReason::Trade);
        assert!(first.is_ok());
        assert!(second.is_ok());

        assert_eq!(balance(&engine, "alice"), Some(coins(80)));
        assert_eq!(balance(&engine, "bob"), Some(coins(120)));
        assert_eq!(
            engine.store().transaction_count().ok(),
            before.map(|n| n + 2)
        );
        let stats = engine.store().stats(Utc::now(), 10, 0).ok();
        assert_eq!(stats.map(|s| s.total_supply), Some(coins(200)));
    }

    #[test]
    fn overspend_fails_without_side_effects() {
        let engine = alice_and_bob();
        let before = engine.store().snapshot().ok();

        let err = engine
            .transfer(&agent("alice"), &agent("bob"), coins(1000), TransactionReason::Trade)
            .err();

        assert!(matches!(err, Some(LedgerError::InsufficientFunds { .. })));
        assert_eq!(engine.store().snapshot().ok(), before);
    }

    #[test]
    fn non_positive_amount_is_invalid() {
        let engine = alice_and_bob();
        let err = engine
            .transfer(&agent("alice"), &agent("bob"), Decimal::ZERO, TransactionReason::Trade)
            .err();
        assert_eq!(err, Some(LedgerError::InvalidAmount { amount: Decimal::ZERO }));
    }

    #[test]
    fn debit_from_missing_wallet_is_unknown() {
        let engine = engine();
        let err = engine
            .transfer(&agent("nobody"), &agent("bob"), coins(1), TransactionReason::Trade)
            .err();
        assert_eq!(err, Some(LedgerError::UnknownWallet(agent("nobody"))));
    }

    #[test]
    fn credit_creates_wallet() {
        let engine = engine();
        let tx = engine.transfer(&AgentId::system(), &agent("newbie"), coins(5), TransactionReason::Mining);
        assert!(tx.is_ok());
        let wallet = engine.store().wallet(&agent("newbie")).ok().flatten();
        assert_eq!(wallet.as_ref().map(|w| w.balance), Some(coins(5)));
        assert_eq!(wallet.map(|w| w.transaction_count), Some(1));
    }

    #[test]
    fn failed_credit_target_is_not_materialised() {
        let engine = alice_and_bob();
        let _ = engine.transfer(&agent("alice"), &agent("carol"), coins(500), TransactionReason::Trade);
        assert_eq!(engine.store().wallet(&agent("carol")).ok(), Some(None));
    }

    #[test]
    fn block_height_increments_per_transaction() {
        let engine = alice_and_bob();
        let start = engine.block_height().ok();
        let txs = engine.execute_all(&[
            TransferRequest::new(agent("alice"), agent("bob"), coins(10), TransactionReason::Trade),
            TransferRequest::penalty(agent("alice"), coins(1), TransactionReason::TradeFee),
        ]);
        assert_eq!(txs.map(|t| t.len()).ok(), Some(2));
        assert_eq!(engine.block_height().ok(), start.map(|h| h + 2));
    }

    #[test]
    fn multi_leg_is_atomic() {
        let engine = alice_and_bob();
        let before = engine.store().snapshot().ok();
        let result = engine.execute_all(&[
            TransferRequest::new(agent("alice"), agent("bob"), coins(90), TransactionReason::Trade),
            TransferRequest::penalty(agent("alice"), coins(20), TransactionReason::TradeFee),
        ]);
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(engine.store().snapshot().ok(), before);
    }

    #[test]
    fn create_wallet_is_idempotent() {
        let engine = engine();
        let _ = engine.create_wallet(&agent("alice"), coins(100));
        let again = engine.create_wallet(&agent("alice"), coins(100)).ok();
        assert_eq!(again.map(|w| w.balance), Some(coins(100)));
        assert_eq!(engine.store().transaction_count().ok(), Some(1));
    }

    #[test]
    fn escrow_round_trip_keeps_holdings() {
        let engine = alice_and_bob();
        let locked = engine.escrow(&agent("alice"), coins(40)).ok();
        assert_eq!(locked.as_ref().map(|w| w.balance), Some(coins(60)));
        assert_eq!(locked.map(|w| w.locked_balance), Some(coins(40)));

        let settled = engine.execute(
            &TransferRequest::new(agent("alice"), agent("bob"), coins(25), TransactionReason::Bounty)
                .from_escrow(),
        );
        assert!(settled.is_ok());

        let released = engine.release_escrow(&agent("alice"), coins(15)).ok();
        assert_eq!(released.as_ref().map(|w| w.balance), Some(coins(75)));
        assert_eq!(released.map(|w| w.locked_balance), Some(Decimal::ZERO));
        assert!(engine.release_escrow(&agent("alice"), coins(1)).is_err());

        let snapshot = engine.store().snapshot().unwrap_or_default();
        assert_eq!(verify_conservation(&snapshot), ConservationResult::Balanced);
    }

    #[test]
    fn concurrent_overspend_never_goes_negative() {
        let engine = engine();
        let _ = engine.create_wallet(&agent("alice"), coins(100));
        let successes = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..16 {
                let engine = &engine;
                let successes = &successes;
                scope.spawn(move || {
                    let to = agent(&format!("buyer-{i}"));
                    if engine
                        .transfer(&agent("alice"), &to, coins(15), TransactionReason::Trade)
                        .is_ok()
                    {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        // 100 / 15 = 6 transfers fit.
        assert_eq!(successes.load(Ordering::SeqCst), 6);
        assert_eq!(balance(&engine, "alice"), Some(coins(10)));
        let snapshot = engine.store().snapshot().unwrap_or_default();
        assert_eq!(verify_conservation(&snapshot), ConservationResult::Balanced);
    }

    #[test]
    fn opposing_transfers_do_not_deadlock() {
        let engine = alice_and_bob();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let _ = engine.transfer(&agent("alice"), &agent("bob"), coins(1), TransactionReason::Trade);
                    }
                });
                scope.spawn(move || {
                    for _ in 0..50 {
                        let _ = engine.transfer(&agent("bob"), &agent("alice"), coins(1), TransactionReason::Trade);
                    }
                });
            }
        });
        let total = balance(&engine, "alice")
            .zip(balance(&engine, "bob"))
            .map(|(a, b)| a + b);
        assert_eq!(total, Some(coins(200)));
    }
}
