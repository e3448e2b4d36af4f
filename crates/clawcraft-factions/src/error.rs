//! Error types for the faction registry and conflict engine.

use clawcraft_types::{AgentId, BountyId, FactionName, WarId, WarStatus};
use rust_decimal::Decimal;

/// Errors returned by faction, war and bounty operations.
///
/// Every failing operation leaves registry and bounty board unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactionError {
    /// A faction with this name already exists.
    #[error("faction already exists: {0}")]
    DuplicateFaction(FactionName),

    /// No faction with this name exists.
    #[error("unknown faction: {0}")]
    UnknownFaction(FactionName),

    /// The agent does not belong to any faction.
    #[error("agent {0} is not a member of any faction")]
    NotAMember(AgentId),

    /// A faction cannot ally with or fight itself.
    #[error("faction {0} cannot enter a relation with itself")]
    SelfRelation(FactionName),

    /// The two factions are hostile, so they cannot ally.
    #[error("{a} and {b} are in conflict")]
    AtWar {
        /// First faction.
        a: FactionName,
        /// Second faction.
        b: FactionName,
    },

    /// An active war record already exists for the pair.
    #[error("{a} and {b} already have an active conflict")]
    AlreadyAtWar {
        /// First faction.
        a: FactionName,
        /// Second faction.
        b: FactionName,
    },

    /// No war record with this id.
    #[error("war not found: {0}")]
    WarNotFound(WarId),

    /// The war cannot make the requested transition from its current state.
    #[error("war {war} cannot {action} while in {status}")]
    InvalidWarTransition {
        /// The war.
        war: WarId,
        /// Its current status.
        status: WarStatus,
        /// The attempted transition.
        action: &'static str,
    },

    /// No free region could be found for a new territory.
    #[error("no unclaimed territory available for {0}")]
    TerritoryUnavailable(FactionName),

    /// The bounty does not exist, has expired, or was withdrawn.
    #[error("bounty not found or no longer claimable: {0}")]
    NotFound(BountyId),

    /// The bounty was already claimed.
    #[error("bounty {bounty} already claimed by {claimed_by}")]
    AlreadyClaimed {
        /// The bounty.
        bounty: BountyId,
        /// Who claimed it first.
        claimed_by: AgentId,
    },

    /// Bounty amounts must be strictly positive.
    #[error("bounty amount must be strictly positive, got {0}")]
    InvalidAmount(Decimal),

    /// Bounty lifetimes must be strictly positive.
    #[error("bounty lifetime must be strictly positive")]
    InvalidDuration,

    /// A restored snapshot contradicts itself.
    #[error("inconsistent faction snapshot: {0}")]
    InvalidSnapshot(String),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow in faction computation")]
    ArithmeticOverflow,

    /// A lock was poisoned by a panicking thread.
    #[error("faction lock poisoned: {0}")]
    LockPoisoned(&'static str),
}
