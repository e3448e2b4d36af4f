//! Whole-game persistence: ledger and faction state flushed and loaded
//! together in one database transaction.
//!
//! ```text
//! GameEconomy::snapshot()
//!     |
//!     +-- GameStore::save() --> BEGIN
//!                                 |-- wallets, transactions
//!                                 |-- factions, territories, wars, bounties
//!                                 +-- faction_events
//!                               COMMIT
//! ```

use sqlx::PgPool;

use clawcraft_core::GameSnapshot;

use crate::economy_store::{load_economy, save_economy};
use crate::error::DbError;
use crate::faction_store::{load_factions, save_factions};

/// Journal rows inserted per statement.
const JOURNAL_BATCH: usize = 500;

/// Saves and loads a complete [`GameSnapshot`].
pub struct GameStore<'a> {
    pool: &'a PgPool,
}

impl<'a> GameStore<'a> {
    /// Create a new store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Flush ledger and faction state atomically.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if any statement fails; the database
    /// keeps the previous flush in that case.
    pub async fn save(&self, snapshot: &GameSnapshot) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        save_economy(&mut *tx, &snapshot.economy, JOURNAL_BATCH).await?;
        save_factions(&mut *tx, &snapshot.factions).await?;
        tx.commit().await?;
        tracing::info!(
            block_height = snapshot.economy.block_height,
            factions = snapshot.factions.factions.len(),
            "Game state flushed"
        );
        Ok(())
    }

    /// Load the last flush, or `None` when nothing has been stored yet.
    ///
    /// Both halves are read inside one repeatable-read transaction so a
    /// concurrent flush cannot be observed half-applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails, or
    /// [`DbError::InvalidRow`] if a stored value no longer parses.
    pub async fn load(&self) -> Result<Option<GameSnapshot>, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        let economy = load_economy(&mut *tx).await?;
        let factions = load_factions(&mut *tx).await?;
        tx.commit().await?;

        let snapshot = GameSnapshot { economy, factions };
        if snapshot == GameSnapshot::default() {
            return Ok(None);
        }
        tracing::info!(
            block_height = snapshot.economy.block_height,
            wallets = snapshot.economy.wallets.len(),
            factions = snapshot.factions.factions.len(),
            "Game state loaded"
        );
        Ok(Some(snapshot))
    }
}
