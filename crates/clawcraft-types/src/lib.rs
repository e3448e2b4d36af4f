//! Shared type definitions for the ClawCraft economy and faction core.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace. Read-model types flow downstream to `TypeScript` via
//! `ts-rs` so dashboards can consume them without hand-written mirrors.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes (UUID v7 for records, strings for names)
//! - [`enums`] -- Closed enumerations (transaction reasons, war status, ...)
//! - [`structs`] -- Entity structs (wallets, transactions, factions, wars)
//! - [`clock`] -- Injectable wall-clock

pub mod clock;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use enums::{
    FactionEventKind, FactionType, LegalStatus, OreType, ParseEnumError, TransactionReason,
    WarStatus,
};
pub use ids::{
    AgentId, BountyId, FactionEventId, FactionName, SYSTEM_AGENT, TerritoryId, TransactionId,
    WarId,
};
pub use structs::{
    Bounty, ContrabandItem, EconomyStats, Faction, FactionEvent, FactionRanking, Territory,
    Transaction, Wallet, WalletSummary, War,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Files land in `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::FactionName::export_all();
        let _ = crate::ids::TerritoryId::export_all();
        let _ = crate::ids::TransactionId::export_all();
        let _ = crate::ids::BountyId::export_all();
        let _ = crate::ids::WarId::export_all();
        let _ = crate::ids::FactionEventId::export_all();

        // Enums
        let _ = crate::enums::TransactionReason::export_all();
        let _ = crate::enums::LegalStatus::export_all();
        let _ = crate::enums::OreType::export_all();
        let _ = crate::enums::FactionType::export_all();
        let _ = crate::enums::WarStatus::export_all();
        let _ = crate::enums::FactionEventKind::export_all();

        // Structs
        let _ = crate::structs::Wallet::export_all();
        let _ = crate::structs::Transaction::export_all();
        let _ = crate::structs::ContrabandItem::export_all();
        let _ = crate::structs::EconomyStats::export_all();
        let _ = crate::structs::WalletSummary::export_all();
        let _ = crate::structs::Faction::export_all();
        let _ = crate::structs::Territory::export_all();
        let _ = crate::structs::Bounty::export_all();
        let _ = crate::structs::War::export_all();
        let _ = crate::structs::FactionEvent::export_all();
        let _ = crate::structs::FactionRanking::export_all();
    }
}
