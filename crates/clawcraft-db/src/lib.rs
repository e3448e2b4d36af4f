//! `PostgreSQL` persistence for ClawCraft.
//!
//! The game economy runs in memory; this crate flushes its snapshots to
//! `PostgreSQL` and loads them back at startup.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`economy_store`] -- Wallets and the append-only transaction journal
//! - [`faction_store`] -- Factions, territories, wars, bounties and the
//!   faction audit log
//! - [`game_store`] -- Atomic save and load of a whole game snapshot
//! - [`error`] -- Shared error types

pub mod economy_store;
pub mod error;
pub mod faction_store;
pub mod game_store;
pub mod postgres;

pub use economy_store::{EconomyStore, TransactionRow, WalletRow};
pub use error::DbError;
pub use faction_store::{
    BountyRow, FactionEventRow, FactionRow, FactionStore, TerritoryRow, WarRow,
};
pub use game_store::GameStore;
pub use postgres::{PostgresConfig, PostgresPool};

/// Convert an unsigned counter to a `BIGINT`, saturating at `i64::MAX`.
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
