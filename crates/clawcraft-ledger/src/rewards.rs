//! Reward rules: pure functions from game events to transfer requests.
//!
//! Nothing here touches the ledger. Callers hand the returned
//! [`TransferRequest`]s to the [`TransferEngine`](crate::TransferEngine).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clawcraft_types::{AgentId, OreType, TransactionReason};

use crate::transfer::TransferRequest;
use crate::{LedgerError, mul, sub, to_cents};

/// Tunable reward and fee constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSchedule {
    /// Coins per unit of base-multiplier ore.
    pub mining_base: Decimal,
    /// Coins per crafted item at difficulty 1.
    pub crafting_base: Decimal,
    /// Coins per placed block.
    pub building_base: Decimal,
    /// Flat reward for a PvP kill.
    pub pvp_kill_reward: Decimal,
    /// Victims at or below this balance pay no death penalty.
    pub pvp_penalty_threshold: Decimal,
    /// Share of the victim's balance taken as a death penalty.
    pub pvp_penalty_rate: Decimal,
    /// Upper bound on the death penalty.
    pub pvp_penalty_cap: Decimal,
    /// Market fee as a share of the total price.
    pub trade_fee_rate: Decimal,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            mining_base: Decimal::new(5, 0),
            crafting_base: Decimal::new(3, 0),
            building_base: Decimal::new(8, 0),
            pvp_kill_reward: Decimal::new(25, 0),
            pvp_penalty_threshold: Decimal::new(10, 0),
            pvp_penalty_rate: Decimal::new(10, 2),
            pvp_penalty_cap: Decimal::new(20, 0),
            trade_fee_rate: Decimal::new(5, 2),
        }
    }
}

/// Mining multiplier for an ore.
pub fn ore_multiplier(ore: OreType) -> Decimal {
    match ore {
        OreType::Coal | OreType::Other => Decimal::ONE,
        OreType::Iron => Decimal::new(15, 1),
        OreType::Gold => Decimal::new(2, 0),
        OreType::Diamond => Decimal::new(5, 0),
        OreType::Emerald => Decimal::new(7, 0),
        OreType::Netherite => Decimal::new(10, 0),
    }
}

/// Maps game events to transfer requests using a [`RewardSchedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardRules {
    schedule: RewardSchedule,
}

impl RewardRules {
    /// Rules with the given schedule.
    pub const fn new(schedule: RewardSchedule) -> Self {
        Self { schedule }
    }

    /// The active schedule.
    pub const fn schedule(&self) -> &RewardSchedule {
        &self.schedule
    }

    /// `mining_base × ore_multiplier × quantity`, or `None` for zero quantity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if the reward overflows.
    pub fn mining(
        &self,
        miner: &AgentId,
        ore: OreType,
        quantity: u32,
    ) -> Result<Option<TransferRequest>, LedgerError> {
        if quantity == 0 {
            return Ok(None);
        }
        let per_unit = mul(self.schedule.mining_base, ore_multiplier(ore))?;
        let amount = mul(per_unit, Decimal::from(quantity))?;
        Ok(reward(miner, amount, TransactionReason::Mining))
    }

    /// `crafting_base × max(1, difficulty)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if the reward overflows.
    pub fn crafting(
        &self,
        crafter: &AgentId,
        difficulty: u32,
    ) -> Result<Option<TransferRequest>, LedgerError> {
        let amount = mul(self.schedule.crafting_base, Decimal::from(difficulty.max(1)))?;
        Ok(reward(crafter, amount, TransactionReason::Crafting))
    }

    /// `building_base × quantity`, or `None` for zero quantity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if the reward overflows.
    pub fn building(
        &self,
        builder: &AgentId,
        quantity: u32,
    ) -> Result<Option<TransferRequest>, LedgerError> {
        let amount = mul(self.schedule.building_base, Decimal::from(quantity))?;
        Ok(reward(builder, amount, TransactionReason::Building))
    }

    /// Flat reward for the killer.
    pub fn pvp_reward(&self, killer: &AgentId) -> Option<TransferRequest> {
        reward(killer, self.schedule.pvp_kill_reward, TransactionReason::PvpKill)
    }

    /// Death penalty for a victim holding `victim_balance`.
    ///
    /// `None` when the balance is at or below the threshold: poor victims
    /// are spared, while the killer is still rewarded.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if the penalty overflows.
    pub fn pvp_penalty(
        &self,
        victim: &AgentId,
        victim_balance: Decimal,
    ) -> Result<Option<TransferRequest>, LedgerError> {
        if victim_balance <= self.schedule.pvp_penalty_threshold {
            return Ok(None);
        }
        let share = to_cents(mul(victim_balance, self.schedule.pvp_penalty_rate)?);
        let amount = share.min(self.schedule.pvp_penalty_cap);
        if amount <= Decimal::ZERO {
            return Ok(None);
        }
        Ok(Some(TransferRequest::penalty(
            victim.clone(),
            amount,
            TransactionReason::PvpPenalty,
        )))
    }

    /// Market fee on a trade worth `total`, rounded down to cents.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if the fee overflows.
    pub fn trade_fee(&self, total: Decimal) -> Result<Decimal, LedgerError> {
        Ok(to_cents(mul(total, self.schedule.trade_fee_rate)?))
    }

    /// Settlement legs for a trade: the seller receives `total - fee` and
    /// the fee goes to the system, both paid by the buyer.
    ///
    /// The fee leg is omitted when the fee rounds to zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a non-positive total.
    pub fn trade_settlement(
        &self,
        buyer: &AgentId,
        seller: &AgentId,
        total: Decimal,
        reason: TransactionReason,
    ) -> Result<Vec<TransferRequest>, LedgerError> {
        if total <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount: total });
        }
        let fee = self.trade_fee(total)?;
        let proceeds = sub(total, fee)?;
        let mut legs = Vec::with_capacity(2);
        if proceeds > Decimal::ZERO {
            legs.push(TransferRequest::new(buyer.clone(), seller.clone(), proceeds, reason));
        }
        if fee > Decimal::ZERO {
            legs.push(TransferRequest::penalty(buyer.clone(), fee, TransactionReason::TradeFee));
        }
        Ok(legs)
    }
}

fn reward(to: &AgentId, amount: Decimal, reason: TransactionReason) -> Option<TransferRequest> {
    (amount > Decimal::ZERO).then(|| TransferRequest::reward(to.clone(), amount, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RewardRules {
        RewardRules::default()
    }

    fn amount(request: Result<Option<TransferRequest>, LedgerError>) -> Option<Decimal> {
        request.ok().flatten().map(|r| r.amount)
    }

    #[test]
    fn mining_scales_by_ore_and_quantity() {
        let miner = AgentId::from("miner");
        assert_eq!(amount(rules().mining(&miner, OreType::Iron, 4)), Some(Decimal::new(30, 0)));
        assert_eq!(amount(rules().mining(&miner, OreType::Netherite, 1)), Some(Decimal::new(50, 0)));
        assert_eq!(amount(rules().mining(&miner, OreType::Other, 2)), Some(Decimal::new(10, 0)));
        assert_eq!(amount(rules().mining(&miner, OreType::Diamond, 0)), None);
    }

    #[test]
    fn mining_reward_comes_from_system() {
        let request = rules().mining(&AgentId::from("miner"), OreType::Coal, 1).ok().flatten();
        assert_eq!(request.as_ref().map(|r| r.from.is_system()), Some(true));
        assert_eq!(request.map(|r| r.reason), Some(TransactionReason::Mining));
    }

    #[test]
    fn crafting_difficulty_floors_at_one() {
        let crafter = AgentId::from("smith");
        assert_eq!(amount(rules().crafting(&crafter, 0)), Some(Decimal::new(3, 0)));
        assert_eq!(amount(rules().crafting(&crafter, 4)), Some(Decimal::new(12, 0)));
    }

    #[test]
    fn building_pays_per_block() {
        let builder = AgentId::from("mason");
        assert_eq!(amount(rules().building(&builder, 3)), Some(Decimal::new(24, 0)));
        assert_eq!(amount(rules().building(&builder, 0)), None);
    }

    #[test]
    fn pvp_penalty_is_ten_percent_capped_at_twenty() {
        let victim = AgentId::from("victim");
        assert_eq!(amount(rules().pvp_penalty(&victim, Decimal::new(100, 0))), Some(Decimal::new(10, 0)));
        assert_eq!(amount(rules().pvp_penalty(&victim, Decimal::new(500, 0))), Some(Decimal::new(20, 0)));
        assert_eq!(amount(rules().pvp_penalty(&victim, Decimal::new(10, 0))), None);
        assert_eq!(amount(rules().pvp_penalty(&victim, Decimal::new(15, 0))), Some(Decimal::new(150, 2)));
    }

    #[test]
    fn trade_settlement_splits_fee() {
        let legs = rules()
            .trade_settlement(
                &AgentId::from("buyer"),
                &AgentId::from("seller"),
                Decimal::new(200, 0),
                TransactionReason::Trade,
            )
            .unwrap_or_default();
        let amounts: Vec<Decimal> = legs.iter().map(|l| l.amount).collect();
        assert_eq!(amounts, vec![Decimal::new(190, 0), Decimal::new(10, 0)]);
        assert!(legs.last().is_some_and(|l| l.to.is_system()));
    }

    #[test]
    fn tiny_trade_has_no_fee_leg() {
        let legs = rules()
            .trade_settlement(
                &AgentId::from("buyer"),
                &AgentId::from("seller"),
                Decimal::new(10, 2),
                TransactionReason::Trade,
            )
            .unwrap_or_default();
        assert_eq!(legs.len(), 1);
    }
}
