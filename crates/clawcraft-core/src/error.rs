//! Error type for the game economy facade.

use clawcraft_factions::FactionError;
use clawcraft_ledger::{LedgerAnomaly, LedgerError};

use crate::config::ConfigError;

/// Errors surfaced by [`GameEconomy`](crate::GameEconomy).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A ledger operation failed; no coins moved.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A faction, war or bounty operation failed.
    #[error(transparent)]
    Faction(#[from] FactionError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A restored ledger failed the conservation audit.
    #[error("restored ledger failed audit: {0}")]
    CorruptLedger(LedgerAnomaly),

    /// The shared random number generator lock was poisoned.
    #[error("random number generator lock poisoned")]
    RngPoisoned,
}
