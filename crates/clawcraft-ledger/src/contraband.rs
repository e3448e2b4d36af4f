//! The contraband market: a fixed catalog of illicit goods with
//! randomised pricing and a risk of being caught on every deal.
//!
//! # Pricing
//!
//! ```text
//! price = base_value
//!       × 1 / max(rarity, rarity_floor)
//!       × risk_multiplier
//!       × volatility            (uniform in [0.80, 1.30])
//!       × demand / supply
//! ```
//!
//! rounded down to cents.
//!
//! # Risk
//!
//! ```text
//! risk = min(risk_cap, base_risk(status) × risk_multiplier × max(floor, 1 - reputation))
//! ```
//!
//! with base risk 0.3 for contraband, 0.1 for restricted goods and 0 for
//! legal ones. Reputation is on a `[-1, 1]` scale.
//!
//! All randomness comes from the caller's `rng`, so outcomes are
//! reproducible with a seeded generator.

use std::collections::BTreeMap;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clawcraft_types::{AgentId, ContrabandItem, LegalStatus, Transaction, TransactionReason};

use crate::rewards::RewardRules;
use crate::transfer::{TransferEngine, TransferRequest};
use crate::{LedgerError, div, mul, sub, to_cents};

/// Resolution of risk rolls, in parts per ten thousand.
const ROLL_SCALE: u32 = 10_000;

// ---------------------------------------------------------------------------
// Settings and market conditions
// ---------------------------------------------------------------------------

/// Tunable pricing and risk parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    /// Lower bound applied to rarity before inverting it.
    pub rarity_floor: Decimal,
    /// Lowest volatility factor, in basis points of 1.
    pub volatility_min_bp: u32,
    /// Highest volatility factor, in basis points of 1.
    pub volatility_max_bp: u32,
    /// Maximum probability of being caught.
    pub risk_cap: Decimal,
    /// Lower bound of the reputation modifier.
    pub reputation_floor: Decimal,
    /// Reputation assumed for buyers outside any faction, on the `[-1, 1]` scale.
    pub default_reputation: Decimal,
    /// Share of the deal total fined when caught.
    pub caught_penalty_rate: Decimal,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            rarity_floor: Decimal::new(1, 2),
            volatility_min_bp: 8_000,
            volatility_max_bp: 13_000,
            risk_cap: Decimal::new(9, 1),
            reputation_floor: Decimal::new(1, 1),
            default_reputation: Decimal::new(5, 1),
            caught_penalty_rate: Decimal::new(5, 1),
        }
    }
}

/// Supply and demand factors for one pricing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConditions {
    /// Supply factor; higher supply lowers prices. Must be positive.
    pub supply: Decimal,
    /// Demand factor; higher demand raises prices.
    pub demand: Decimal,
}

impl MarketConditions {
    /// Balanced market (both factors 1).
    pub const fn neutral() -> Self {
        Self {
            supply: Decimal::ONE,
            demand: Decimal::ONE,
        }
    }

    /// Draw street conditions for one deal: supply in `[0.80, 1.20]`,
    /// demand in `[0.90, 1.10]`.
    pub fn sample(rng: &mut impl Rng) -> Self {
        let supply: i64 = rng.random_range(80..=120);
        let demand: i64 = rng.random_range(90..=110);
        Self {
            supply: Decimal::new(supply, 2),
            demand: Decimal::new(demand, 2),
        }
    }
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

/// A request to buy contraband.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContrabandOrder {
    /// Paying agent.
    pub buyer: AgentId,
    /// Receiving agent.
    pub seller: AgentId,
    /// Catalog id.
    pub item_id: String,
    /// Units bought.
    pub quantity: u32,
    /// Buyer reputation on a `[-1, 1]` scale.
    pub reputation: Decimal,
}

/// A deal that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDeal {
    /// Catalog id.
    pub item_id: String,
    /// Units bought.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// `unit_price × quantity`, paid by the buyer.
    pub total: Decimal,
    /// Market fee paid to the system.
    pub fee: Decimal,
    /// What the seller received.
    pub seller_proceeds: Decimal,
    /// The catch probability that was rolled against.
    pub risk: Decimal,
    /// Settlement transactions.
    pub transactions: Vec<Transaction>,
}

/// A deal in which the buyer was caught.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaughtDeal {
    /// Catalog id.
    pub item_id: String,
    /// Units the buyer attempted to buy.
    pub quantity: u32,
    /// The deal total that would have been paid.
    pub total: Decimal,
    /// Fine paid to the system.
    pub penalty: Decimal,
    /// The catch probability that was rolled against.
    pub risk: Decimal,
    /// The fine transaction, absent when the fine rounds to zero.
    pub transaction: Option<Transaction>,
}

/// Outcome of [`ContrabandMarket::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DealOutcome {
    /// Goods delivered, seller paid.
    Completed(CompletedDeal),
    /// Buyer caught and fined; seller receives nothing.
    Caught(CaughtDeal),
}

/// A current quote for one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Catalog id.
    pub item_id: String,
    /// Display name.
    pub name: String,
    /// Legal status.
    pub legal_status: LegalStatus,
    /// Unit price under the quoted conditions.
    pub price: Decimal,
    /// Catch probability at the quoted reputation.
    pub risk: Decimal,
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// The contraband catalog plus its pricing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContrabandMarket {
    catalog: BTreeMap<String, ContrabandItem>,
    settings: MarketSettings,
}

impl Default for ContrabandMarket {
    fn default() -> Self {
        Self::new(default_catalog(), MarketSettings::default())
    }
}

impl ContrabandMarket {
    /// A market over `items`. Later duplicates of an id replace earlier ones.
    pub fn new(items: Vec<ContrabandItem>, settings: MarketSettings) -> Self {
        let catalog = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
        Self { catalog, settings }
    }

    /// Catalog entries ordered by id.
    pub fn items(&self) -> impl Iterator<Item = &ContrabandItem> {
        self.catalog.values()
    }

    /// Number of catalog entries.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Look up a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ItemNotFound`] for an unknown id.
    pub fn item(&self, item_id: &str) -> Result<&ContrabandItem, LedgerError> {
        self.catalog
            .get(item_id)
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.to_owned()))
    }

    /// Unit price of `item_id` under `conditions`, with a fresh volatility
    /// draw from `rng`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ItemNotFound`], or
    /// [`LedgerError::InvalidMarketConditions`] for a non-positive supply.
    pub fn price(
        &self,
        item_id: &str,
        conditions: MarketConditions,
        rng: &mut impl Rng,
    ) -> Result<Decimal, LedgerError> {
        let item = self.item(item_id)?;
        if conditions.supply <= Decimal::ZERO {
            return Err(LedgerError::InvalidMarketConditions("supply must be positive"));
        }
        if conditions.demand.is_sign_negative() {
            return Err(LedgerError::InvalidMarketConditions("demand must not be negative"));
        }

        let (low, high) = ordered(self.settings.volatility_min_bp, self.settings.volatility_max_bp);
        let volatility = Decimal::new(i64::from(rng.random_range(low..=high)), 4);

        let scarcity = div(Decimal::ONE, item.rarity.max(self.settings.rarity_floor))?;
        let market = div(conditions.demand, conditions.supply)?;
        let price = mul(
            mul(mul(mul(item.base_value, scarcity)?, item.risk_multiplier)?, volatility)?,
            market,
        )?;
        Ok(to_cents(price))
    }

    /// Probability of being caught trading `item_id` at `reputation`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ItemNotFound`] for an unknown id.
    pub fn risk(&self, item_id: &str, reputation: Decimal) -> Result<Decimal, LedgerError> {
        let item = self.item(item_id)?;
        let modifier = sub(Decimal::ONE, reputation)?.max(self.settings.reputation_floor);
        let raw = mul(mul(base_risk(item.legal_status), item.risk_multiplier)?, modifier)?;
        Ok(raw.min(self.settings.risk_cap))
    }

    /// Quote every catalog item under neutral conditions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ArithmeticOverflow`] if a price overflows.
    pub fn quote_all(
        &self,
        reputation: Decimal,
        rng: &mut impl Rng,
    ) -> Result<Vec<PriceQuote>, LedgerError> {
        let mut quotes = Vec::with_capacity(self.catalog.len());
        for item in self.catalog.values() {
            quotes.push(PriceQuote {
                item_id: item.id.clone(),
                name: item.name.clone(),
                legal_status: item.legal_status,
                price: self.price(&item.id, MarketConditions::neutral(), rng)?,
                risk: self.risk(&item.id, reputation)?,
            });
        }
        Ok(quotes)
    }

    /// Price, risk-roll and settle a deal.
    ///
    /// The buyer's balance is checked before rolling. When caught, the
    /// buyer pays a fine to the system and the seller receives nothing.
    /// Otherwise the payment and fee legs settle atomically.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for a zero quantity.
    /// - [`LedgerError::SelfTransfer`] when buyer and seller coincide.
    /// - [`LedgerError::ItemNotFound`] for an unknown item.
    /// - [`LedgerError::InsufficientFunds`] when the buyer is short.
    pub fn execute(
        &self,
        order: &ContrabandOrder,
        engine: &TransferEngine,
        rules: &RewardRules,
        rng: &mut impl Rng,
    ) -> Result<DealOutcome, LedgerError> {
        if order.quantity == 0 {
            return Err(LedgerError::InvalidAmount {
                amount: Decimal::ZERO,
            });
        }
        if order.buyer == order.seller {
            return Err(LedgerError::SelfTransfer(order.buyer.clone()));
        }

        let conditions = MarketConditions::sample(rng);
        let unit_price = self.price(&order.item_id, conditions, rng)?;
        let total = mul(unit_price, Decimal::from(order.quantity))?;
        if total <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount: total });
        }

        let available = engine.store().balance(&order.buyer)?;
        if available < total {
            return Err(LedgerError::InsufficientFunds {
                agent: order.buyer.clone(),
                available,
                requested: total,
            });
        }

        let risk = self.risk(&order.item_id, order.reputation)?;
        let roll = Decimal::new(i64::from(rng.random_range(0..ROLL_SCALE)), 4);

        if roll < risk {
            let penalty = to_cents(mul(total, self.settings.caught_penalty_rate)?);
            let transaction = if penalty > Decimal::ZERO {
                Some(engine.execute(&TransferRequest::penalty(
                    order.buyer.clone(),
                    penalty,
                    TransactionReason::ContrabandPenalty,
                ))?)
            } else {
                None
            };
            tracing::warn!(
                buyer = %order.buyer,
                item = %order.item_id,
                total = %total,
                penalty = %penalty,
                risk = %risk,
                "contraband deal intercepted"
            );
            return Ok(DealOutcome::Caught(CaughtDeal {
                item_id: order.item_id.clone(),
                quantity: order.quantity,
                total,
                penalty,
                risk,
                transaction,
            }));
        }

        let fee = rules.trade_fee(total)?;
        let legs = rules.trade_settlement(
            &order.buyer,
            &order.seller,
            total,
            TransactionReason::ContrabandTrade,
        )?;
        let transactions = engine.execute_all(&legs)?;
        let seller_proceeds = sub(total, fee)?;

        tracing::info!(
            buyer = %order.buyer,
            seller = %order.seller,
            item = %order.item_id,
            quantity = order.quantity,
            total = %total,
            fee = %fee,
            risk = %risk,
            "contraband deal completed"
        );
        Ok(DealOutcome::Completed(CompletedDeal {
            item_id: order.item_id.clone(),
            quantity: order.quantity,
            unit_price,
            total,
            fee,
            seller_proceeds,
            risk,
            transactions,
        }))
    }
}

/// Base catch probability by legal status.
///
/// Legal goods carry no base risk, so trading them can never be caught;
/// restricted goods start at 0.1 and contraband at 0.3.
pub const fn base_risk(status: LegalStatus) -> Decimal {
    match status {
        LegalStatus::Legal => Decimal::ZERO,
        LegalStatus::Restricted => Decimal::from_parts(1, 0, 0, false, 1),
        LegalStatus::Contraband => Decimal::from_parts(3, 0, 0, false, 1),
    }
}

const fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// The stock catalog shipped with the game.
pub fn default_catalog() -> Vec<ContrabandItem> {
    let item = |id: &str,
                name: &str,
                base: i64,
                rarity: Decimal,
                risk_multiplier: Decimal,
                legal_status: LegalStatus,
                description: &str| ContrabandItem {
        id: id.to_owned(),
        name: name.to_owned(),
        base_value: Decimal::new(base, 0),
        rarity,
        risk_multiplier,
        legal_status,
        description: description.to_owned(),
    };
    vec![
        item(
            "diamond_dust",
            "Diamond Dust",
            50,
            Decimal::new(1, 1),
            Decimal::new(25, 1),
            LegalStatus::Contraband,
            "Illegally processed diamond powder",
        ),
        item(
            "ghost_essence",
            "Ghost Essence",
            75,
            Decimal::new(5, 2),
            Decimal::new(3, 0),
            LegalStatus::Contraband,
            "Ethereal substance from the void",
        ),
        item(
            "void_crystal",
            "Void Crystal",
            150,
            Decimal::new(2, 2),
            Decimal::new(4, 0),
            LegalStatus::Contraband,
            "Forbidden crystal from the end dimension",
        ),
        item(
            "blood_iron",
            "Blood Iron",
            25,
            Decimal::new(2, 1),
            Decimal::new(18, 1),
            LegalStatus::Restricted,
            "Iron forged with questionable methods",
        ),
        item(
            "cursed_gold",
            "Cursed Gold",
            40,
            Decimal::new(15, 2),
            Decimal::new(22, 1),
            LegalStatus::Restricted,
            "Gold touched by dark magic",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use clawcraft_types::SystemClock;

    use super::*;
    use crate::LedgerStore;

    fn market() -> ContrabandMarket {
        ContrabandMarket::default()
    }

    fn funded_engine(buyer_funds: i64) -> TransferEngine {
        let engine = TransferEngine::new(Arc::new(LedgerStore::new()), Arc::new(SystemClock));
        let _ = engine.create_wallet(&AgentId::from("buyer"), Decimal::new(buyer_funds, 0));
        engine
    }

    fn order(item: &str, quantity: u32, reputation: Decimal) -> ContrabandOrder {
        ContrabandOrder {
            buyer: AgentId::from("buyer"),
            seller: AgentId::from("seller"),
            item_id: item.to_owned(),
            quantity,
            reputation,
        }
    }

    #[test]
    fn catalog_has_five_items() {
        assert_eq!(market().len(), 5);
        assert!(market().item("void_crystal").is_ok());
        assert!(matches!(
            market().item("moonshine"),
            Err(LedgerError::ItemNotFound(_))
        ));
    }

    #[test]
    fn price_is_deterministic_for_a_seed() {
        let m = market();
        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        let pa = m.price("diamond_dust", MarketConditions::neutral(), &mut a).ok();
        let pb = m.price("diamond_dust", MarketConditions::neutral(), &mut b).ok();
        assert!(pa.is_some());
        assert_eq!(pa, pb);
    }

    #[test]
    fn price_stays_within_volatility_band() {
        // diamond_dust: 50 × 10 × 2.5 = 1250 before volatility.
        let m = market();
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..200 {
            let price = m
                .price("diamond_dust", MarketConditions::neutral(), &mut rng)
                .unwrap_or_default();
            assert!(price >= Decimal::new(1000, 0), "{price}");
            assert!(price <= Decimal::new(1625, 0), "{price}");
            assert_eq!(price, to_cents(price));
        }
    }

    #[test]
    fn zero_supply_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(1);
        let conditions = MarketConditions {
            supply: Decimal::ZERO,
            demand: Decimal::ONE,
        };
        assert!(matches!(
            market().price("blood_iron", conditions, &mut rng),
            Err(LedgerError::InvalidMarketConditions(_))
        ));
    }

    #[test]
    fn risk_follows_status_reputation_and_cap() {
        let m = market();
        // 0.3 × 2.5 × 0.5
        assert_eq!(m.risk("diamond_dust", Decimal::new(5, 1)).ok(), Some(Decimal::new(375, 3)));
        // 0.1 × 1.8 × max(0.1, 1 - 1) = 0.018
        assert_eq!(m.risk("blood_iron", Decimal::ONE).ok(), Some(Decimal::new(18, 3)));
        // 0.3 × 4.0 × 2.0 = 2.4, capped
        assert_eq!(m.risk("void_crystal", Decimal::NEGATIVE_ONE).ok(), Some(Decimal::new(9, 1)));
    }

    #[test]
    fn broke_buyer_is_rejected_before_rolling() {
        let engine = funded_engine(10);
        let mut rng = SmallRng::seed_from_u64(3);
        let result = market().execute(
            &order("void_crystal", 1, Decimal::ZERO),
            &engine,
            &RewardRules::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(engine.store().transaction_count().ok(), Some(1));
    }

    #[test]
    fn deals_settle_or_fine_without_breaking_conservation() {
        let engine = funded_engine(1_000_000);
        let rules = RewardRules::default();
        let m = market();
        let mut rng = SmallRng::seed_from_u64(2024);
        let (mut completed, mut caught) = (0, 0);

        for _ in 0..50 {
            let outcome = m.execute(&order("blood_iron", 2, Decimal::ZERO), &engine, &rules, &mut rng);
            assert!(outcome.is_ok(), "{outcome:?}");
            match outcome {
                Ok(DealOutcome::Completed(deal)) => {
                    completed += 1;
                    assert_eq!(deal.seller_proceeds + deal.fee, deal.total);
                    assert_eq!(deal.risk, Decimal::new(18, 2));
                }
                Ok(DealOutcome::Caught(deal)) => {
                    caught += 1;
                    assert_eq!(deal.penalty, to_cents(deal.total * Decimal::new(5, 1)));
                }
                Err(_) => {}
            }
        }

        assert!(completed > 0);
        assert!(caught > 0);
        let snapshot = engine.store().snapshot().unwrap_or_default();
        assert_eq!(
            crate::verify_conservation(&snapshot),
            crate::ConservationResult::Balanced
        );
    }

    #[test]
    fn legal_goods_are_never_intercepted() {
        let mut items = default_catalog();
        items.push(ContrabandItem {
            id: "bread".to_owned(),
            name: "Bread".to_owned(),
            base_value: Decimal::ONE,
            rarity: Decimal::ONE,
            risk_multiplier: Decimal::ONE,
            legal_status: LegalStatus::Legal,
            description: "Just bread".to_owned(),
        });
        let m = ContrabandMarket::new(items, MarketSettings::default());
        let engine = funded_engine(1_000);
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..20 {
            let outcome = m.execute(&order("bread", 1, Decimal::ZERO), &engine, &RewardRules::default(), &mut rng);
            assert!(matches!(outcome, Ok(DealOutcome::Completed(_))));
        }
    }
}
