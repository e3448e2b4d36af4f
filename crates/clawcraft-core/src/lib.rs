//! Configuration and the game economy facade for ClawCraft.
//!
//! [`GameEconomy`] wires the ledger, the contraband market and the conflict
//! engine together and is the single entry point for the game server, the
//! CLI and tests.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `clawcraft-config.yaml` into
//!   strongly-typed structs.
//! - [`economy`] -- [`GameEconomy`] construction, snapshots and queries.
//! - [`handlers`] -- Game events: mining, crafting, building and kills.
//! - [`operator`] -- Admin commands: transfers, trades, factions, wars and
//!   bounties.
//! - [`error`] -- [`CoreError`].

pub mod config;
pub mod economy;
pub mod error;
pub mod handlers;
pub mod operator;

pub use config::{ConfigError, GameConfig};
pub use economy::{GameEconomy, GameSnapshot, TOP_WALLETS};
pub use error::CoreError;
pub use handlers::{BountyPayout, KillOutcome};
