//! Game event intake: mining, crafting, building and PvP kills.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clawcraft_factions::{BountyClaim, FactionError, KillReport};
use clawcraft_ledger::{LedgerError, TransferRequest};
use clawcraft_types::{AgentId, BountyId, OreType, Transaction, TransactionReason};

use crate::economy::GameEconomy;
use crate::error::CoreError;

/// A bounty paid out to its claimant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyPayout {
    /// The claimed bounty.
    pub bounty: BountyId,
    /// Who collected it.
    pub claimant: AgentId,
    /// Amount paid.
    pub amount: Decimal,
    /// Payout transaction; `None` when an issuer's escrow was simply
    /// returned to themselves.
    pub transaction: Option<Transaction>,
}

/// Everything one PvP kill caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillOutcome {
    /// Penalty taken from the victim, if one applied and succeeded.
    pub penalty: Option<Transaction>,
    /// Reward paid to the killer.
    pub reward: Option<Transaction>,
    /// Faction-level effects.
    pub report: KillReport,
    /// Bounties on the victim collected by the killer.
    pub bounties: Vec<BountyPayout>,
}

impl GameEconomy {
    /// Reward `agent` for mining `quantity` units of `ore`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if the reward cannot be recorded.
    pub fn on_mined(
        &self,
        agent: &AgentId,
        ore: OreType,
        quantity: u32,
    ) -> Result<Option<Transaction>, CoreError> {
        let request = self.rules.mining(agent, ore, quantity)?;
        self.pay(request)
    }

    /// Reward `agent` for crafting `item` at `difficulty`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if the reward cannot be recorded.
    pub fn on_crafted(
        &self,
        agent: &AgentId,
        item: &str,
        difficulty: u32,
    ) -> Result<Option<Transaction>, CoreError> {
        let request = self.rules.crafting(agent, difficulty)?;
        debug!(%agent, item, difficulty, "crafted");
        self.pay(request)
    }

    /// Reward `agent` for placing `quantity` blocks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] if the reward cannot be recorded.
    pub fn on_built(
        &self,
        agent: &AgentId,
        quantity: u32,
    ) -> Result<Option<Transaction>, CoreError> {
        let request = self.rules.building(agent, quantity)?;
        self.pay(request)
    }

    /// Apply a PvP kill.
    ///
    /// In order: the victim's death penalty (best effort, skipped for poor
    /// victims), the killer's reward, faction reputation and war scoring,
    /// then claim and payout of every active bounty on the victim. A bounty
    /// whose payout fails stays open and is left out of the outcome.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Ledger`] with [`LedgerError::SelfTransfer`] for a
    ///   self-kill, or if the killer's reward cannot be recorded.
    /// - [`CoreError::Faction`] if faction state cannot be updated.
    pub fn on_killed(
        &self,
        killer: &AgentId,
        victim: &AgentId,
    ) -> Result<KillOutcome, CoreError> {
        if killer == victim {
            return Err(LedgerError::SelfTransfer(killer.clone()).into());
        }

        let victim_balance = self.engine.store().balance(victim)?;
        let penalty = match self.rules.pvp_penalty(victim, victim_balance)? {
            Some(request) => match self.engine.execute(&request) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    debug!(%victim, error = %e, "death penalty skipped");
                    None
                }
            },
            None => {
                debug!(%victim, balance = %victim_balance, "victim below penalty threshold");
                None
            }
        };

        let reward = self.pay(self.rules.pvp_reward(killer))?;
        let report = self.conflict.record_kill(killer, victim)?;

        let mut bounties = Vec::new();
        for bounty in self.conflict.bounties_on(victim)? {
            match self.conflict.claim_bounty(bounty.id, killer) {
                Ok(claim) => match self.settle_claim(&claim, killer) {
                    Ok(payout) => bounties.push(payout),
                    Err(e) => {
                        warn!(bounty = %bounty.id, error = %e, "bounty left open after failed payout");
                    }
                },
                Err(FactionError::AlreadyClaimed { .. } | FactionError::NotFound(_)) => {
                    debug!(bounty = %bounty.id, "bounty taken before payout");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(KillOutcome {
            penalty,
            reward,
            report,
            bounties,
        })
    }

    /// Execute an optional single-leg reward.
    pub(crate) fn pay(
        &self,
        request: Option<TransferRequest>,
    ) -> Result<Option<Transaction>, CoreError> {
        request
            .map(|r| self.engine.execute(&r))
            .transpose()
            .map_err(CoreError::from)
    }

    /// Pay a fresh claim, reopening the bounty if the payout fails.
    pub(crate) fn settle_claim(
        &self,
        claim: &BountyClaim,
        claimant: &AgentId,
    ) -> Result<BountyPayout, CoreError> {
        match self.pay_bounty(claim, claimant) {
            Ok(payout) => Ok(payout),
            Err(e) => {
                self.conflict.reopen_bounty(claim.bounty.id, claimant)?;
                Err(e)
            }
        }
    }

    /// Move a claimed bounty's amount to the claimant.
    ///
    /// Escrowed bounties are paid from the issuer's locked balance; system
    /// bounties are minted.
    pub(crate) fn pay_bounty(
        &self,
        claim: &BountyClaim,
        claimant: &AgentId,
    ) -> Result<BountyPayout, CoreError> {
        let bounty = &claim.bounty;
        let transaction = if bounty.escrowed && &bounty.issuer == claimant {
            self.engine.release_escrow(claimant, claim.amount)?;
            None
        } else if bounty.escrowed {
            let request = TransferRequest::new(
                bounty.issuer.clone(),
                claimant.clone(),
                claim.amount,
                TransactionReason::Bounty,
            )
            .from_escrow();
            match self.engine.execute(&request) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(
                        bounty = %bounty.id,
                        issuer = %bounty.issuer,
                        error = %e,
                        "escrowed bounty could not be paid"
                    );
                    return Err(e.into());
                }
            }
        } else {
            Some(self.engine.execute(&TransferRequest::reward(
                claimant.clone(),
                claim.amount,
                TransactionReason::Bounty,
            ))?)
        };
        Ok(BountyPayout {
            bounty: bounty.id,
            claimant: claimant.clone(),
            amount: claim.amount,
            transaction,
        })
    }
}
