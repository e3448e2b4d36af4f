//! Closed enumerations for ledger reasons, legal status, factions and wars.
//!
//! Every enum that is persisted has a stable lowercase name exposed through
//! `as_str` and parsed back through [`FromStr`]. The same names are used for
//! the serde representation, the database columns and the CLI.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A string did not name any variant of the expected enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    /// The enum that was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Implements `as_str`, [`FromStr`] and `Display` from one name table.
macro_rules! named_variants {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable lowercase name used in storage and on the command line.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl core::fmt::Display for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Why a transaction happened. Every confirmed transaction carries exactly
/// one reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TransactionReason {
    /// Reward for mining ore.
    Mining,
    /// Reward for crafting an item.
    Crafting,
    /// Reward for placing blocks.
    Building,
    /// Reward paid to the killer in PvP.
    PvpKill,
    /// Death penalty paid by the PvP victim.
    PvpPenalty,
    /// Payment from buyer to seller in a legal trade.
    Trade,
    /// Market fee paid by the buyer on any completed trade.
    TradeFee,
    /// Payment from buyer to seller in a contraband deal.
    ContrabandTrade,
    /// Fine paid by a buyer caught dealing contraband.
    ContrabandPenalty,
    /// Payout of a claimed bounty.
    Bounty,
    /// Operator-initiated transfer or starting grant.
    Manual,
}

named_variants!(TransactionReason, "transaction reason", {
    Mining => "mining",
    Crafting => "crafting",
    Building => "building",
    PvpKill => "pvp_kill",
    PvpPenalty => "pvp_penalty",
    Trade => "trade",
    TradeFee => "trade_fee",
    ContrabandTrade => "contraband_trade",
    ContrabandPenalty => "contraband_penalty",
    Bounty => "bounty",
    Manual => "manual",
});

/// Legal status of a catalog item, which sets its base trade risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LegalStatus {
    /// Freely tradable; no risk of being caught.
    Legal,
    /// Tolerated but watched.
    Restricted,
    /// Outlawed goods.
    Contraband,
}

named_variants!(LegalStatus, "legal status", {
    Legal => "legal",
    Restricted => "restricted",
    Contraband => "contraband",
});

/// Ore kinds with distinct mining multipliers.
///
/// Unrecognised block names map to [`OreType::Other`], which mines at the
/// base rate instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OreType {
    /// Coal ore.
    Coal,
    /// Iron ore.
    Iron,
    /// Gold ore.
    Gold,
    /// Diamond ore.
    Diamond,
    /// Emerald ore.
    Emerald,
    /// Ancient debris / netherite.
    Netherite,
    /// Anything else (stone, copper, modded blocks...).
    Other,
}

named_variants!(OreType, "ore type", {
    Coal => "coal",
    Iron => "iron",
    Gold => "gold",
    Diamond => "diamond",
    Emerald => "emerald",
    Netherite => "netherite",
    Other => "other",
});

impl OreType {
    /// Classify a block or item name such as `deepslate_gold_ore`.
    pub fn classify(block: &str) -> Self {
        let lowered = block.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("minecraft:").unwrap_or(&lowered);
        let name = name.strip_prefix("deepslate_").unwrap_or(name);
        let name = name.strip_suffix("_ore").unwrap_or(name);
        match name {
            "ancient_debris" | "netherite_scrap" => Self::Netherite,
            other => other.parse().unwrap_or(Self::Other),
        }
    }
}

// ---------------------------------------------------------------------------
// Factions
// ---------------------------------------------------------------------------

/// Archetype of a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FactionType {
    /// Construction-focused.
    Builders,
    /// Resource extraction.
    Miners,
    /// Combat-focused.
    Warriors,
    /// Commerce-focused.
    Traders,
    /// Smugglers and raiders.
    Outlaws,
}

named_variants!(FactionType, "faction type", {
    Builders => "builders",
    Miners => "miners",
    Warriors => "warriors",
    Traders => "traders",
    Outlaws => "outlaws",
});

/// Lifecycle state of a war record.
///
/// ```text
/// Tension --> War <--> Armistice
///    |         |          |
///    +---------+----------+--> Peace (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum WarStatus {
    /// Ended; the record is history.
    Peace,
    /// Hostile but not fighting; may escalate to war.
    Tension,
    /// Open war. The only state in which kills score.
    War,
    /// Ceasefire; hostilities paused.
    Armistice,
}

named_variants!(WarStatus, "war status", {
    Peace => "peace",
    Tension => "tension",
    War => "war",
    Armistice => "armistice",
});

impl WarStatus {
    /// Whether the record still counts as an active conflict between the pair.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Peace)
    }
}

/// Category of a faction audit-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FactionEventKind {
    /// The faction was founded.
    Created,
    /// An agent joined.
    MemberJoined,
    /// An agent left.
    MemberLeft,
    /// Leadership moved to another member (or lapsed).
    LeaderChanged,
    /// A territory was claimed.
    TerritoryClaimed,
    /// An alliance was formed.
    AllianceFormed,
    /// An alliance was dissolved.
    AllianceBroken,
    /// Tension with another faction began.
    TensionRaised,
    /// War was declared.
    WarDeclared,
    /// A ceasefire was called.
    ArmisticeCalled,
    /// Fighting resumed after a ceasefire.
    WarResumed,
    /// A war ended without a victor.
    PeaceMade,
    /// The faction won a war.
    WarWon,
    /// The faction lost a war.
    WarLost,
    /// A member issued a bounty.
    BountyIssued,
    /// A bounty was placed on a member.
    BountyReceived,
    /// A member claimed a bounty.
    BountyClaimed,
    /// A bounty on a member expired unclaimed.
    BountyExpired,
}

named_variants!(FactionEventKind, "faction event kind", {
    Created => "created",
    MemberJoined => "member_joined",
    MemberLeft => "member_left",
    LeaderChanged => "leader_changed",
    TerritoryClaimed => "territory_claimed",
    AllianceFormed => "alliance_formed",
    AllianceBroken => "alliance_broken",
    TensionRaised => "tension_raised",
    WarDeclared => "war_declared",
    ArmisticeCalled => "armistice_called",
    WarResumed => "war_resumed",
    PeaceMade => "peace_made",
    WarWon => "war_won",
    WarLost => "war_lost",
    BountyIssued => "bounty_issued",
    BountyReceived => "bounty_received",
    BountyClaimed => "bounty_claimed",
    BountyExpired => "bounty_expired",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for reason in TransactionReason::ALL {
            assert_eq!(reason.as_str().parse::<TransactionReason>().ok(), Some(*reason));
        }
        for kind in FactionEventKind::ALL {
            assert_eq!(kind.to_string().parse::<FactionEventKind>().ok(), Some(*kind));
        }
    }

    #[test]
    fn serde_names_match_storage_names() {
        let json = serde_json::to_string(&TransactionReason::ContrabandPenalty).ok();
        assert_eq!(json.as_deref(), Some("\"contraband_penalty\""));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "bribe".parse::<TransactionReason>().err();
        assert_eq!(
            err,
            Some(ParseEnumError {
                kind: "transaction reason",
                value: "bribe".to_owned(),
            })
        );
    }

    #[test]
    fn ore_classification_accepts_block_names() {
        assert_eq!(OreType::classify("diamond_ore"), OreType::Diamond);
        assert_eq!(OreType::classify("minecraft:deepslate_gold_ore"), OreType::Gold);
        assert_eq!(OreType::classify("Ancient_Debris"), OreType::Netherite);
        assert_eq!(OreType::classify("cobblestone"), OreType::Other);
    }

    #[test]
    fn only_peace_is_inactive() {
        assert!(!WarStatus::Peace.is_active());
        assert!(WarStatus::Tension.is_active());
        assert!(WarStatus::War.is_active());
        assert!(WarStatus::Armistice.is_active());
    }
}
