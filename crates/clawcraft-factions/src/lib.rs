//! Factions, wars and bounties for the ClawCraft world.
//!
//! # Modules
//!
//! - [`registry`] -- [`FactionRegistry`]: faction identity, membership,
//!   territory, reputation, power and alliances behind one lock.
//! - [`conflict`] -- [`ConflictEngine`]: war declaration, scoring and
//!   resolution, plus bounty issue, claim and expiry.
//! - [`war`] -- War state machine and kill scoring ([`KillReport`]).
//! - [`bounty`] -- [`BountyBoard`] with exactly-once claims.
//! - [`territory`] -- Non-overlapping territory placement.
//! - [`seed`] -- The five default factions.
//! - [`error`] -- [`FactionError`].
//!
//! Nothing in this crate moves coins. Treasury changes from war settlement
//! are faction-internal; bounty payouts and escrow belong to the ledger.

pub mod bounty;
pub mod conflict;
pub mod error;
pub mod registry;
pub mod seed;
pub mod territory;
pub mod war;

pub use bounty::{BountyBoard, BountyClaim};
pub use conflict::{ConflictEngine, ConflictSettings, FactionSnapshot};
pub use error::FactionError;
pub use registry::{FactionRegistry, FactionSettings, MAX_REPUTATION, MIN_REPUTATION, NewFaction};
pub use seed::default_factions;
pub use war::{KillReport, WarVictory};
