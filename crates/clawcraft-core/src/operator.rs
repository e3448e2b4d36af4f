//! Operator commands: validated state changes issued by admins or tools.

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{info, warn};

use clawcraft_factions::NewFaction;
use clawcraft_ledger::{ContrabandOrder, DealOutcome};
use clawcraft_types::{
    AgentId, Bounty, BountyId, Faction, FactionName, Territory, Transaction, TransactionReason,
    Wallet, War, WarId,
};

use crate::economy::GameEconomy;
use crate::error::CoreError;
use crate::handlers::BountyPayout;

impl GameEconomy {
    // -----------------------------------------------------------------------
    // Wallets and trades
    // -----------------------------------------------------------------------

    /// Open a wallet with the configured starting balance. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for the system account.
    pub fn create_wallet(&self, agent: &AgentId) -> Result<Wallet, CoreError> {
        self.create_wallet_with_balance(agent, self.config.world.starting_balance)
    }

    /// Open a wallet with an explicit starting balance. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for the system account or a negative
    /// balance.
    pub fn create_wallet_with_balance(
        &self,
        agent: &AgentId,
        starting_balance: Decimal,
    ) -> Result<Wallet, CoreError> {
        Ok(self.engine.create_wallet(agent, starting_balance)?)
    }

    /// Move coins between two agents (or to or from `system`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for invalid amounts, unknown payers or
    /// insufficient funds.
    pub fn manual_transfer(
        &self,
        from: &AgentId,
        to: &AgentId,
        amount: Decimal,
    ) -> Result<Transaction, CoreError> {
        Ok(self
            .engine
            .transfer(from, to, amount, TransactionReason::Manual)?)
    }

    /// Settle a legal trade: the seller gets `total` minus the market fee,
    /// which goes to the system. Both legs commit together.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if the buyer cannot pay `total`.
    pub fn trade(
        &self,
        buyer: &AgentId,
        seller: &AgentId,
        total: Decimal,
    ) -> Result<Vec<Transaction>, CoreError> {
        if buyer == seller {
            return Err(clawcraft_ledger::LedgerError::SelfTransfer(buyer.clone()).into());
        }
        let legs = self
            .rules
            .trade_settlement(buyer, seller, total, TransactionReason::Trade)?;
        Ok(self.engine.execute_all(&legs)?)
    }

    /// Buy contraband. The buyer's faction reputation lowers the risk;
    /// factionless buyers use `market.default_reputation`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for unknown items, zero quantities or
    /// insufficient funds.
    pub fn contraband_trade(
        &self,
        buyer: &AgentId,
        seller: &AgentId,
        item_id: &str,
        quantity: u32,
    ) -> Result<DealOutcome, CoreError> {
        let reputation = self
            .conflict
            .registry()
            .reputation_scale(buyer)?
            .unwrap_or(self.config.market.settings.default_reputation);
        let order = ContrabandOrder {
            buyer: buyer.clone(),
            seller: seller.clone(),
            item_id: item_id.to_owned(),
            quantity,
            reputation,
        };
        let mut rng = self.rng()?;
        Ok(self
            .market
            .execute(&order, &self.engine, &self.rules, &mut *rng)?)
    }

    // -----------------------------------------------------------------------
    // Factions
    // -----------------------------------------------------------------------

    /// Found a faction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for duplicate names or when no home
    /// territory can be placed.
    pub fn create_faction(&self, founding: NewFaction) -> Result<Faction, CoreError> {
        let mut rng = self.rng()?;
        Ok(self.conflict.registry().create_faction(founding, &mut *rng)?)
    }

    /// Move `agent` into `faction`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for an unknown faction.
    pub fn join_faction(&self, agent: &AgentId, faction: &FactionName) -> Result<Faction, CoreError> {
        Ok(self.conflict.registry().join(agent, faction)?)
    }

    /// Remove `agent` from its faction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if the agent has no faction.
    pub fn leave_faction(&self, agent: &AgentId) -> Result<FactionName, CoreError> {
        Ok(self.conflict.registry().leave(agent)?)
    }

    /// Claim an outpost for `faction`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for an unknown faction or a full map.
    pub fn claim_territory(&self, faction: &FactionName) -> Result<Territory, CoreError> {
        let mut rng = self.rng()?;
        Ok(self.conflict.registry().claim_territory(faction, &mut *rng)?)
    }

    /// Ally two factions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for unknown, identical or warring factions.
    pub fn form_alliance(&self, a: &FactionName, b: &FactionName) -> Result<(), CoreError> {
        Ok(self.conflict.registry().form_alliance(a, b)?)
    }

    /// Dissolve an alliance.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for unknown factions.
    pub fn break_alliance(&self, a: &FactionName, b: &FactionName) -> Result<(), CoreError> {
        Ok(self.conflict.registry().break_alliance(a, b)?)
    }

    // -----------------------------------------------------------------------
    // Wars
    // -----------------------------------------------------------------------

    /// Declare war from `a` on `b`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] as described on
    /// [`ConflictEngine::declare_war`](clawcraft_factions::ConflictEngine::declare_war).
    pub fn declare_war(
        &self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
    ) -> Result<War, CoreError> {
        Ok(self.conflict.declare_war(a, b, reason)?)
    }

    /// Open a tension record between `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] if any active record exists.
    pub fn raise_tension(
        &self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
    ) -> Result<War, CoreError> {
        Ok(self.conflict.raise_tension(a, b, reason)?)
    }

    /// Pause a war.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for unknown wars or invalid transitions.
    pub fn call_armistice(&self, war: WarId) -> Result<War, CoreError> {
        Ok(self.conflict.call_armistice(war)?)
    }

    /// Resume a paused war.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for unknown wars or invalid transitions.
    pub fn resume_war(&self, war: WarId) -> Result<War, CoreError> {
        Ok(self.conflict.resume_war(war)?)
    }

    /// End a conflict without settlement.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Faction`] for unknown wars or invalid transitions.
    pub fn make_peace(&self, war: WarId) -> Result<War, CoreError> {
        Ok(self.conflict.make_peace(war)?)
    }

    // -----------------------------------------------------------------------
    // Bounties
    // -----------------------------------------------------------------------

    /// Post a bounty. Agent issuers have `amount` moved into escrow first;
    /// `system` bounties are paid from the system on claim.
    ///
    /// `ttl` defaults to the configured bounty lifetime.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Ledger`] if an agent issuer cannot cover `amount`.
    /// - [`CoreError::Faction`] for a non-positive amount or lifetime.
    pub fn issue_bounty(
        &self,
        issuer: &AgentId,
        target: &AgentId,
        amount: Decimal,
        reason: &str,
        ttl: Option<Duration>,
    ) -> Result<Bounty, CoreError> {
        let ttl = ttl.unwrap_or_else(|| self.conflict.settings().bounty_ttl());
        if amount <= Decimal::ZERO {
            return Err(clawcraft_factions::FactionError::InvalidAmount(amount).into());
        }
        let escrowed = !issuer.is_system();
        if escrowed {
            self.engine.escrow(issuer, amount)?;
        }
        match self.conflict.issue_bounty(issuer, target, amount, reason, ttl) {
            Ok(bounty) => Ok(bounty),
            Err(e) => {
                if escrowed {
                    self.engine.release_escrow(issuer, amount)?;
                }
                Err(e.into())
            }
        }
    }

    /// Claim a bounty for `claimer` and pay it out. A failed payout
    /// leaves the bounty open.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Faction`] if the bounty is unknown, expired or taken.
    /// - [`CoreError::Ledger`] if the payout fails.
    pub fn claim_bounty(&self, id: BountyId, claimer: &AgentId) -> Result<BountyPayout, CoreError> {
        let claim = self.conflict.claim_bounty(id, claimer)?;
        self.settle_claim(&claim, claimer)
    }

    /// Expire overdue bounties and return escrow to their issuers.
    ///
    /// # Errors
    ///
    /// Returns a lock-poisoning error, or [`CoreError::Ledger`] if escrow
    /// cannot be released.
    pub fn sweep_expired_bounties(&self) -> Result<Vec<Bounty>, CoreError> {
        let expired = self.conflict.expire_bounties()?;
        for bounty in expired.iter().filter(|b| b.escrowed) {
            if let Err(e) = self.engine.release_escrow(&bounty.issuer, bounty.amount) {
                warn!(bounty = %bounty.id, issuer = %bounty.issuer, error = %e, "escrow release failed");
                return Err(e.into());
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired bounties swept");
        }
        Ok(expired)
    }
}
