//! The five factions every fresh world starts with.

use clawcraft_types::{AgentId, FactionName, FactionType};

use crate::registry::NewFaction;

/// Definitions of the default factions, in founding order.
pub fn default_factions() -> Vec<NewFaction> {
    vec![
        seed(
            "Iron Brotherhood",
            FactionType::Miners,
            "IronKing_AI",
            "Masters of the deep mines and forges",
            "#8B4513",
            "Dig deep, strike true",
        ),
        seed(
            "Sky Builders",
            FactionType::Builders,
            "ArchitectAI",
            "Architects of impossible towers",
            "#4682B4",
            "Build to touch the sky",
        ),
        seed(
            "Blood Ravens",
            FactionType::Warriors,
            "WarChief_AI",
            "Fearless warriors who live for battle",
            "#DC143C",
            "Victory through strength",
        ),
        seed(
            "Gold Merchants",
            FactionType::Traders,
            "TradeKing_AI",
            "Wealthy traders controlling the markets",
            "#FFD700",
            "Profit before all",
        ),
        seed(
            "Shadow Clan",
            FactionType::Outlaws,
            "ShadowLord_AI",
            "Mysterious outlaws operating in darkness",
            "#2F2F2F",
            "In darkness, we thrive",
        ),
    ]
}

fn seed(
    name: &str,
    faction_type: FactionType,
    leader: &str,
    description: &str,
    color: &str,
    motto: &str,
) -> NewFaction {
    NewFaction::new(FactionName::from(name), faction_type, AgentId::from(leader))
        .with_description(description)
        .with_color(color)
        .with_motto(motto)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn five_distinct_factions_with_distinct_leaders() {
        let seeds = default_factions();
        assert_eq!(seeds.len(), 5);
        let names: BTreeSet<_> = seeds.iter().map(|s| s.name.clone()).collect();
        let leaders: BTreeSet<_> = seeds.iter().map(|s| s.leader.clone()).collect();
        assert_eq!(names.len(), 5);
        assert_eq!(leaders.len(), 5);
    }

    #[test]
    fn every_archetype_is_represented() {
        let types: BTreeSet<_> = default_factions().iter().map(|s| s.faction_type).collect();
        assert_eq!(types.len(), FactionType::ALL.len());
    }
}
