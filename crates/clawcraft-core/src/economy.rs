//! The [`GameEconomy`] facade: construction, snapshots and the read model.
//!
//! Game events live in [`handlers`](crate::handlers) and operator commands
//! in [`operator`](crate::operator); both are further `impl` blocks on the
//! same type.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use clawcraft_factions::{ConflictEngine, FactionRegistry, FactionSnapshot};
use clawcraft_ledger::{
    ConservationResult, ContrabandMarket, EconomySnapshot, LedgerStore, PriceQuote, RewardRules,
    TransferEngine, verify_conservation,
};
use clawcraft_types::{
    AgentId, Bounty, Clock, EconomyStats, Faction, FactionEvent, FactionRanking, Transaction,
    Wallet, War,
};

use crate::config::GameConfig;
use crate::error::CoreError;

/// Number of wallets listed in [`EconomyStats::top_wallets`].
pub const TOP_WALLETS: usize = 10;

/// Full persisted state of the game economy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Wallets, journal and block height.
    pub economy: EconomySnapshot,
    /// Factions, territories, wars, bounties and the audit log.
    pub factions: FactionSnapshot,
}

/// Ledger, market, factions and conflicts behind one handle.
///
/// All methods take `&self`; the type is `Send + Sync` and meant to be
/// shared across threads (for example behind an `Arc`).
pub struct GameEconomy {
    pub(crate) config: GameConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) engine: TransferEngine,
    pub(crate) rules: RewardRules,
    pub(crate) market: ContrabandMarket,
    pub(crate) conflict: ConflictEngine,
    rng: Mutex<StdRng>,
}

impl core::fmt::Debug for GameEconomy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GameEconomy")
            .field("world", &self.config.world.name)
            .finish_non_exhaustive()
    }
}

impl GameEconomy {
    /// Fresh state: no wallets, and the default factions when
    /// `world.seed_factions` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the default factions cannot be
    /// placed.
    pub fn new(config: GameConfig, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let store = Arc::new(LedgerStore::new());
        let registry = Arc::new(FactionRegistry::new(config.factions.clone(), Arc::clone(&clock)));
        let conflict = ConflictEngine::new(registry, config.conflict.clone());
        let economy = Self::assemble(config, clock, store, conflict);
        if economy.config.world.seed_factions {
            let seeded = economy
                .conflict
                .registry()
                .seed_defaults(&mut *economy.rng()?)?;
            if seeded > 0 {
                info!(count = seeded, "default factions seeded");
            }
        }
        Ok(economy)
    }

    /// Rebuild from a snapshot.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CorruptLedger`] if the ledger fails the conservation
    ///   audit.
    /// - [`CoreError::Faction`] if the faction records contradict each other.
    pub fn restore(
        config: GameConfig,
        clock: Arc<dyn Clock>,
        snapshot: GameSnapshot,
    ) -> Result<Self, CoreError> {
        if let ConservationResult::Anomaly(anomaly) = verify_conservation(&snapshot.economy) {
            return Err(CoreError::CorruptLedger(anomaly));
        }
        let store = Arc::new(LedgerStore::restore(snapshot.economy));
        let conflict = ConflictEngine::restore(
            config.factions.clone(),
            config.conflict.clone(),
            Arc::clone(&clock),
            snapshot.factions,
        )?;
        let economy = Self::assemble(config, clock, store, conflict);
        info!(
            block_height = economy.engine.block_height()?,
            "game economy restored"
        );
        Ok(economy)
    }

    fn assemble(
        config: GameConfig,
        clock: Arc<dyn Clock>,
        store: Arc<LedgerStore>,
        conflict: ConflictEngine,
    ) -> Self {
        Self {
            engine: TransferEngine::new(store, Arc::clone(&clock)),
            rules: RewardRules::new(config.economy.clone()),
            market: ContrabandMarket::new(
                config.market.catalog.clone(),
                config.market.settings.clone(),
            ),
            rng: Mutex::new(StdRng::seed_from_u64(config.world.seed)),
            conflict,
            clock,
            config,
        }
    }

    pub(crate) fn rng(&self) -> Result<MutexGuard<'_, StdRng>, CoreError> {
        let Ok(guard) = self.rng.lock() else {
            return Err(CoreError::RngPoisoned);
        };
        Ok(guard)
    }

    /// Active configuration.
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The transfer engine, for callers that need raw ledger access.
    pub const fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// The conflict engine and, through it, the faction registry.
    pub const fn conflict(&self) -> &ConflictEngine {
        &self.conflict
    }

    /// Copy out ledger and faction state.
    ///
    /// # Errors
    ///
    /// Returns a lock-poisoning error from either store.
    pub fn snapshot(&self) -> Result<GameSnapshot, CoreError> {
        Ok(GameSnapshot {
            economy: self.engine.store().snapshot()?,
            factions: self.conflict.snapshot()?,
        })
    }

    // -----------------------------------------------------------------------
    // Read model
    // -----------------------------------------------------------------------

    /// One wallet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if a wallet lock is poisoned.
    pub fn wallet(&self, agent: &AgentId) -> Result<Option<Wallet>, CoreError> {
        Ok(self.engine.store().wallet(agent)?)
    }

    /// All wallets ordered by agent id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if a wallet lock is poisoned.
    pub fn list_wallets(&self) -> Result<Vec<Wallet>, CoreError> {
        Ok(self.engine.store().wallets()?)
    }

    /// Supply, volume and leaderboard figures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] on lock poisoning or overflow.
    pub fn economy_stats(&self) -> Result<EconomyStats, CoreError> {
        let items = u32::try_from(self.market.len()).unwrap_or(u32::MAX);
        Ok(self
            .engine
            .store()
            .stats(self.clock.now(), TOP_WALLETS, items)?)
    }

    /// The latest `limit` transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if the journal lock is poisoned.
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, CoreError> {
        Ok(self.engine.store().recent_transactions(limit)?)
    }

    /// Run the conservation audit over a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if a lock is poisoned.
    pub fn audit(&self) -> Result<ConservationResult, CoreError> {
        Ok(verify_conservation(&self.engine.store().snapshot()?))
    }

    /// Current contraband quotes at neutral conditions, with risk quoted at
    /// the factionless default reputation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] on overflow.
    pub fn contraband_prices(&self) -> Result<Vec<PriceQuote>, CoreError> {
        let mut rng = self.rng()?;
        Ok(self.market.quote_all(self.config.market.settings.default_reputation, &mut *rng)?)
    }

    /// All factions ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the registry lock is poisoned.
    pub fn list_factions(&self) -> Result<Vec<Faction>, CoreError> {
        Ok(self.conflict.registry().list_factions()?)
    }

    /// Power leaderboard.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the registry lock is poisoned.
    pub fn faction_rankings(&self) -> Result<Vec<FactionRanking>, CoreError> {
        Ok(self.conflict.registry().rankings()?)
    }

    /// Wars in `Tension`, `War` or `Armistice`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the registry lock is poisoned.
    pub fn active_wars(&self) -> Result<Vec<War>, CoreError> {
        Ok(self.conflict.active_wars()?)
    }

    /// Claimable bounties.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the board lock is poisoned.
    pub fn active_bounties(&self) -> Result<Vec<Bounty>, CoreError> {
        Ok(self.conflict.active_bounties()?)
    }

    /// The faction audit log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the registry lock is poisoned.
    pub fn faction_events(&self) -> Result<Vec<FactionEvent>, CoreError> {
        Ok(self.conflict.registry().events()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use clawcraft_types::SystemClock;

    use super::*;

    fn quiet_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.world.seed_factions = false;
        config
    }

    #[test]
    fn new_seeds_default_factions() {
        let economy = GameEconomy::new(GameConfig::default(), Arc::new(SystemClock)).unwrap();
        assert_eq!(economy.list_factions().unwrap().len(), 5);
        assert_eq!(economy.faction_rankings().unwrap().len(), 5);
        assert!(economy.list_wallets().unwrap().is_empty());
    }

    #[test]
    fn seeding_can_be_disabled() {
        let economy = GameEconomy::new(quiet_config(), Arc::new(SystemClock)).unwrap();
        assert!(economy.list_factions().unwrap().is_empty());
    }

    #[test]
    fn stats_report_catalog_size() {
        let economy = GameEconomy::new(quiet_config(), Arc::new(SystemClock)).unwrap();
        let stats = economy.economy_stats().unwrap();
        assert_eq!(stats.contraband_items, 5);
        assert_eq!(stats.total_supply, Decimal::ZERO);
        assert_eq!(economy.contraband_prices().unwrap().len(), 5);
    }

    #[test]
    fn restore_rejects_unbalanced_ledger() {
        let economy = GameEconomy::new(quiet_config(), Arc::new(SystemClock)).unwrap();
        economy.create_wallet(&AgentId::from("alice")).unwrap();
        let mut snapshot = economy.snapshot().unwrap();
        if let Some(wallet) = snapshot.economy.wallets.first_mut() {
            wallet.balance = Decimal::new(1_000_000, 0);
        }
        assert!(matches!(
            GameEconomy::restore(quiet_config(), Arc::new(SystemClock), snapshot),
            Err(CoreError::CorruptLedger(_))
        ));
    }
}
