//! Core entity structs: wallets, transactions, catalog items, factions,
//! territories, bounties, wars and the read-model summaries built from them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{FactionEventKind, FactionType, LegalStatus, TransactionReason, WarStatus};
use crate::ids::{AgentId, BountyId, FactionEventId, FactionName, TerritoryId, TransactionId, WarId};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// An agent's account.
///
/// `balance` is spendable; `locked_balance` is held in escrow (for example
/// behind a bounty the agent funded). Both are never negative. The system
/// pseudo-wallet never has a `Wallet` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Wallet {
    /// Owner of the wallet.
    pub agent_id: AgentId,
    /// Spendable funds.
    #[ts(as = "String")]
    pub balance: Decimal,
    /// Funds held in escrow.
    #[ts(as = "String")]
    pub locked_balance: Decimal,
    /// Lifetime credits.
    #[ts(as = "String")]
    pub total_earned: Decimal,
    /// Lifetime debits.
    #[ts(as = "String")]
    pub total_spent: Decimal,
    /// Number of confirmed transactions touching this wallet.
    pub transaction_count: u64,
    /// Time of the last balance change.
    pub last_activity: DateTime<Utc>,
    /// When the wallet was opened.
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// An empty wallet opened at `now`.
    pub const fn empty(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            balance: Decimal::ZERO,
            locked_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            transaction_count: 0,
            last_activity: now,
            created_at: now,
        }
    }

    /// Spendable plus escrowed funds, or `None` on overflow.
    pub fn holdings(&self) -> Option<Decimal> {
        self.balance.checked_add(self.locked_balance)
    }
}

/// An immutable, confirmed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Transaction {
    /// Unique transaction id.
    pub id: TransactionId,
    /// Debited account (`system` for minted rewards).
    pub from: AgentId,
    /// Credited account (`system` for burned penalties and fees).
    pub to: AgentId,
    /// Strictly positive amount moved.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Why the money moved.
    pub reason: TransactionReason,
    /// Wall-clock time of confirmation.
    pub timestamp: DateTime<Utc>,
    /// Logical block height; strictly increasing across the journal.
    pub block_height: u64,
    /// Always `true` for journal entries; failed transfers leave no record.
    pub confirmed: bool,
}

/// A static entry in the contraband catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ContrabandItem {
    /// Catalog key, e.g. `void_crystal`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base value before scarcity, risk and market adjustments.
    #[ts(as = "String")]
    pub base_value: Decimal,
    /// Scarcity in `(0, 1]`; rarer goods are priced higher.
    #[ts(as = "String")]
    pub rarity: Decimal,
    /// Scales both price and risk of being caught.
    #[ts(as = "String")]
    pub risk_multiplier: Decimal,
    /// Legal status, which sets the base risk.
    pub legal_status: LegalStatus,
    /// Flavour text.
    pub description: String,
}

/// Top-line economy numbers for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EconomyStats {
    /// Sum of all wallet holdings (spendable plus escrowed).
    #[ts(as = "String")]
    pub total_supply: Decimal,
    /// Number of confirmed transactions.
    pub total_transactions: u64,
    /// Sum of amounts confirmed in the last 24 hours.
    #[ts(as = "String")]
    pub volume_24h: Decimal,
    /// Richest wallets by spendable balance.
    pub top_wallets: Vec<WalletSummary>,
    /// Number of wallets.
    pub wallet_count: u64,
    /// Current logical block height.
    pub block_height: u64,
    /// Number of items in the contraband catalog.
    pub contraband_items: u32,
}

/// One line of the wealth leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WalletSummary {
    /// Wallet owner.
    pub agent_id: AgentId,
    /// Spendable balance.
    #[ts(as = "String")]
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Factions
// ---------------------------------------------------------------------------

/// A faction and its standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Faction {
    /// Unique name.
    pub name: FactionName,
    /// Archetype.
    pub faction_type: FactionType,
    /// Current leader; always a member. `None` once the last member leaves.
    pub leader: Option<AgentId>,
    /// Current members.
    pub members: BTreeSet<AgentId>,
    /// Faction funds, never negative.
    #[ts(as = "String")]
    pub treasury: Decimal,
    /// Standing in `[-100, 100]`.
    pub reputation: i32,
    /// Ranking score.
    pub power: u32,
    /// Owned territories in claim order.
    pub territories: Vec<TerritoryId>,
    /// Allied factions; disjoint from `enemies`.
    pub allies: BTreeSet<FactionName>,
    /// Factions with which an active war record exists.
    pub enemies: BTreeSet<FactionName>,
    /// Founding time.
    pub created_at: DateTime<Utc>,
    /// Flavour text.
    pub description: String,
    /// Display colour, e.g. `#8B4513`.
    pub color: String,
    /// Motto.
    pub motto: String,
}

impl Faction {
    /// A faction with no members is dormant but still registered.
    pub fn is_dormant(&self) -> bool {
        self.members.is_empty()
    }
}

/// A circular region of the world owned by one faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Territory {
    /// Territory id.
    pub id: TerritoryId,
    /// Owner.
    pub faction: FactionName,
    /// Center X coordinate in blocks.
    pub center_x: i64,
    /// Center Z coordinate in blocks.
    pub center_z: i64,
    /// Radius in blocks.
    pub radius: u32,
    /// Stockpiled resources by name.
    pub resources: BTreeMap<String, u32>,
    /// Structures standing on the territory.
    pub structures: Vec<String>,
    /// Fortification level.
    pub defense_level: u32,
    /// Last time the territory was fought over.
    pub last_contested: Option<DateTime<Utc>>,
}

/// A reward pledged on a target agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Bounty {
    /// Bounty id.
    pub id: BountyId,
    /// Agent whose death pays out.
    pub target: AgentId,
    /// Who pledged the reward (`system` for operator bounties).
    pub issuer: AgentId,
    /// Strictly positive reward.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Why the bounty was posted.
    pub reason: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// The bounty cannot be claimed at or after this instant.
    pub expires_at: DateTime<Utc>,
    /// Claimant, once claimed.
    pub claimed_by: Option<AgentId>,
    /// Claim time, once claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Open for claims.
    pub active: bool,
    /// Whether the reward is held in the issuer's escrow.
    pub escrowed: bool,
}

/// A conflict record between two factions.
///
/// The pair is unordered: `faction_a` is the declaring side and
/// `score_a` counts its kills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct War {
    /// War id.
    pub id: WarId,
    /// Declaring faction.
    pub faction_a: FactionName,
    /// Defending faction.
    pub faction_b: FactionName,
    /// Lifecycle state.
    pub status: WarStatus,
    /// Kills scored by `faction_a`.
    pub score_a: u32,
    /// Kills scored by `faction_b`.
    pub score_b: u32,
    /// Stated casus belli.
    pub reason: String,
    /// Share of the loser's treasury paid to the winner.
    #[ts(as = "String")]
    pub stakes: Decimal,
    /// Record creation time.
    pub started_at: DateTime<Utc>,
    /// Set when the record reaches [`WarStatus::Peace`].
    pub ended_at: Option<DateTime<Utc>>,
    /// Winner, when the war ended by reaching the victory threshold.
    pub winner: Option<FactionName>,
}

impl War {
    /// Whether this record is between `x` and `y`, in either order.
    pub fn is_between(&self, x: &FactionName, y: &FactionName) -> bool {
        (&self.faction_a == x && &self.faction_b == y)
            || (&self.faction_a == y && &self.faction_b == x)
    }

    /// The other side of the war, if `faction` is a participant.
    pub fn opponent_of(&self, faction: &FactionName) -> Option<&FactionName> {
        if &self.faction_a == faction {
            Some(&self.faction_b)
        } else if &self.faction_b == faction {
            Some(&self.faction_a)
        } else {
            None
        }
    }
}

/// One entry of the faction audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FactionEvent {
    /// Event id.
    pub id: FactionEventId,
    /// Faction the event is filed under.
    pub faction: FactionName,
    /// Category.
    pub kind: FactionEventKind,
    /// Human-readable summary.
    pub description: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// One row of the power leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FactionRanking {
    /// 1-based position.
    pub rank: u32,
    /// Faction name.
    pub name: FactionName,
    /// Archetype.
    pub faction_type: FactionType,
    /// Ranking score.
    pub power: u32,
    /// Member count.
    pub members: u32,
    /// Treasury.
    #[ts(as = "String")]
    pub treasury: Decimal,
    /// Reputation.
    pub reputation: i32,
    /// Number of territories.
    pub territories: u32,
}
