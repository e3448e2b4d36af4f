//! Wallet ledger and transfer engine for the ClawCraft economy.
//!
//! Every coin in the game lives in a [`Wallet`](clawcraft_types::Wallet)
//! held by the [`LedgerStore`], and every movement of coins goes through
//! the [`TransferEngine`], which records exactly one confirmed
//! [`Transaction`](clawcraft_types::Transaction) per leg. Coins enter
//! circulation only as credits from the `system` pseudo-wallet and leave
//! only as debits to it.
//!
//! # Architecture
//!
//! - [`store`] -- [`LedgerStore`]: per-wallet locked balances plus the
//!   append-only journal and block height.
//! - [`transfer`] -- [`TransferEngine`]: atomic single- and multi-leg
//!   transfers, wallet creation, escrow.
//! - [`transaction`] -- [`TransactionBuilder`] for validated journal entries.
//! - [`rewards`] -- [`RewardRules`]: pure mapping of game events to
//!   [`TransferRequest`]s.
//! - [`contraband`] -- [`ContrabandMarket`]: catalog pricing, risk and
//!   deal execution.
//! - [`conservation`] -- Supply audit over a ledger snapshot.
//!
//! # Conservation Law
//!
//! ```text
//! sum(balance + locked over all wallets)
//!     == sum(amounts from system) - sum(amounts to system)
//! ```
//!
//! A violation produces a [`LedgerAnomaly`]. The ledger never panics; it
//! returns errors.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use clawcraft_ledger::{LedgerStore, TransferEngine};
//! use clawcraft_types::{AgentId, SystemClock, TransactionReason};
//! use rust_decimal::Decimal;
//!
//! let engine = TransferEngine::new(Arc::new(LedgerStore::new()), Arc::new(SystemClock));
//! let alice = AgentId::from("alice");
//! let bob = AgentId::from("bob");
//!
//! engine.create_wallet(&alice, Decimal::new(100, 0)).ok();
//! let tx = engine.transfer(&alice, &bob, Decimal::new(30, 0), TransactionReason::Trade);
//! assert!(tx.is_ok());
//! ```

pub mod conservation;
pub mod contraband;
pub mod rewards;
pub mod store;
pub mod transaction;
pub mod transfer;

// Re-export primary types at crate root.
pub use conservation::{ConservationResult, verify_conservation};
pub use contraband::{
    CaughtDeal, CompletedDeal, ContrabandMarket, ContrabandOrder, DealOutcome, MarketConditions,
    MarketSettings, PriceQuote,
};
pub use rewards::{RewardRules, RewardSchedule};
pub use store::{EconomySnapshot, LedgerStore};
pub use transaction::TransactionBuilder;
pub use transfer::{FundSource, TransferEngine, TransferRequest};

use rust_decimal::Decimal;

use clawcraft_types::AgentId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors returned by ledger operations.
///
/// A failed transfer leaves every wallet and the journal untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Amounts must be strictly positive.
    #[error("amount must be strictly positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: Decimal,
    },

    /// The debited wallet cannot cover the amount.
    #[error("insufficient funds in wallet {agent}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The wallet that was short.
        agent: AgentId,
        /// Funds available in the debited pool (spendable or escrowed).
        available: Decimal,
        /// Amount the operation needed.
        requested: Decimal,
    },

    /// A debit was requested from a wallet that does not exist.
    #[error("no wallet for agent {0}")]
    UnknownWallet(AgentId),

    /// Source and destination are the same account.
    #[error("cannot transfer from {0} to itself")]
    SelfTransfer(AgentId),

    /// The contraband catalog has no such item.
    #[error("contraband item not found: {0}")]
    ItemNotFound(String),

    /// Market supply/demand factors must be positive.
    #[error("invalid market conditions: {0}")]
    InvalidMarketConditions(&'static str),

    /// A required field was not set on a builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Checked decimal arithmetic overflowed.
    #[error("arithmetic overflow in ledger computation")]
    ArithmeticOverflow,

    /// A lock was poisoned by a panicking thread.
    #[error("ledger lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation-law violation found by [`verify_conservation`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedgerAnomaly {
    /// Block height of the audited snapshot.
    pub block_height: u64,
    /// Sum of wallet holdings.
    pub supply: Decimal,
    /// Net amount minted by the system according to the journal.
    pub expected_supply: Decimal,
    /// One line per violated rule.
    pub violations: Vec<String>,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ledger anomaly at block {}: supply {} vs expected {} ({})",
            self.block_height,
            self.supply,
            self.expected_supply,
            self.violations.join("; ")
        )
    }
}

// ---------------------------------------------------------------------------
// Checked decimal helpers
// ---------------------------------------------------------------------------

pub(crate) fn add(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::ArithmeticOverflow)
}

pub(crate) fn sub(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_sub(b).ok_or(LedgerError::ArithmeticOverflow)
}

pub(crate) fn mul(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_mul(b).ok_or(LedgerError::ArithmeticOverflow)
}

pub(crate) fn div(a: Decimal, b: Decimal) -> Result<Decimal, LedgerError> {
    a.checked_div(b).ok_or(LedgerError::ArithmeticOverflow)
}

/// Round down to cents, the precision of every ledger amount.
pub(crate) fn to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero)
}
