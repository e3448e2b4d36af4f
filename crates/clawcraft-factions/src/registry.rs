//! Faction registry: identity, membership, territory and alliances.
//!
//! All registry state (factions, the agent-to-faction index, territories,
//! war records and the audit log) sits behind one `RwLock`. Every mutation
//! runs inside a single write section, so a leader handoff, a join that
//! implies a leave, or a war settlement is never observed half-applied.
//!
//! # Invariants
//!
//! - An agent appears in at most one faction's `members`, and the reverse
//!   index agrees with the member sets.
//! - A faction's leader is one of its members; `None` only when dormant.
//! - `allies` and `enemies` are disjoint.
//! - Reputation stays within `[-100, 100]`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use clawcraft_types::{
    AgentId, Clock, Faction, FactionEvent, FactionEventId, FactionEventKind, FactionName,
    FactionRanking, FactionType, Territory, TerritoryId, War, WarId,
};

use crate::error::FactionError;
use crate::seed::default_factions;
use crate::territory::{find_free_center, home_territory, outpost, slug, unique_id};

/// Lowest reputation a faction can fall to.
pub const MIN_REPUTATION: i32 = -100;
/// Highest reputation a faction can reach.
pub const MAX_REPUTATION: i32 = 100;

// ---------------------------------------------------------------------------
// Settings and inputs
// ---------------------------------------------------------------------------

/// Starting values and placement bounds for new factions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactionSettings {
    /// Treasury of a newly founded faction.
    pub starting_treasury: Decimal,
    /// Power of a newly founded faction.
    pub starting_power: u32,
    /// Radius of every claimed territory, in blocks.
    pub territory_radius: u32,
    /// Territory centers are sampled within `[-world_extent, world_extent]`.
    pub world_extent: i64,
    /// Random placement attempts before a claim fails.
    pub claim_attempts: u32,
}

impl Default for FactionSettings {
    fn default() -> Self {
        Self {
            starting_treasury: Decimal::new(500, 0),
            starting_power: 10,
            territory_radius: 50,
            world_extent: 1000,
            claim_attempts: 64,
        }
    }
}

/// Parameters for founding a faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFaction {
    /// Unique name.
    pub name: FactionName,
    /// Archetype.
    pub faction_type: FactionType,
    /// Founding leader and sole initial member.
    pub leader: AgentId,
    /// Flavour text.
    pub description: String,
    /// Display colour.
    pub color: String,
    /// Motto.
    pub motto: String,
}

impl NewFaction {
    /// A faction definition with empty flavour text and a grey colour.
    pub fn new(name: FactionName, faction_type: FactionType, leader: AgentId) -> Self {
        Self {
            name,
            faction_type,
            leader,
            description: String::new(),
            color: "#808080".to_owned(),
            motto: String::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the display colour.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the motto.
    #[must_use]
    pub fn with_motto(mut self, motto: impl Into<String>) -> Self {
        self.motto = motto.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Locked state
// ---------------------------------------------------------------------------

/// Everything guarded by the registry lock.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) factions: BTreeMap<FactionName, Faction>,
    pub(crate) membership: BTreeMap<AgentId, FactionName>,
    pub(crate) territories: BTreeMap<TerritoryId, Territory>,
    pub(crate) wars: BTreeMap<WarId, War>,
    pub(crate) events: Vec<FactionEvent>,
}

impl RegistryState {
    /// Append an audit-log entry.
    pub(crate) fn log(
        &mut self,
        faction: &FactionName,
        kind: FactionEventKind,
        description: String,
        now: DateTime<Utc>,
    ) {
        self.events.push(FactionEvent {
            id: FactionEventId::new(),
            faction: faction.clone(),
            kind,
            description,
            timestamp: now,
        });
    }

    pub(crate) fn faction(&self, name: &FactionName) -> Result<&Faction, FactionError> {
        self.factions
            .get(name)
            .ok_or_else(|| FactionError::UnknownFaction(name.clone()))
    }

    pub(crate) fn faction_mut(&mut self, name: &FactionName) -> Result<&mut Faction, FactionError> {
        self.factions
            .get_mut(name)
            .ok_or_else(|| FactionError::UnknownFaction(name.clone()))
    }

    /// Shift a faction's reputation by `delta`, clamped to the valid range.
    pub(crate) fn adjust_reputation(&mut self, name: &FactionName, delta: i32) {
        if let Some(faction) = self.factions.get_mut(name) {
            faction.reputation = faction
                .reputation
                .saturating_add(delta)
                .clamp(MIN_REPUTATION, MAX_REPUTATION);
        }
    }

    /// Remove `agent` from its faction, handing leadership on if needed.
    ///
    /// Returns the faction left, or `None` if the agent was factionless.
    fn detach(&mut self, agent: &AgentId, now: DateTime<Utc>) -> Option<FactionName> {
        let name = self.membership.remove(agent)?;
        let mut new_leader = None;
        if let Some(faction) = self.factions.get_mut(&name) {
            faction.members.remove(agent);
            faction.power = faction.power.saturating_sub(1);
            if faction.leader.as_ref() == Some(agent) {
                faction.leader = faction.members.first().cloned();
                new_leader = Some(faction.leader.clone());
            }
        }
        self.log(&name, FactionEventKind::MemberLeft, format!("{agent} left {name}"), now);
        match new_leader {
            Some(Some(leader)) => self.log(
                &name,
                FactionEventKind::LeaderChanged,
                format!("{leader} now leads {name}"),
                now,
            ),
            Some(None) => self.log(
                &name,
                FactionEventKind::LeaderChanged,
                format!("{name} is dormant without a leader"),
                now,
            ),
            None => {}
        }
        Some(name)
    }

    /// Add `agent` to an existing faction.
    fn attach(&mut self, agent: &AgentId, name: &FactionName, now: DateTime<Utc>) {
        let mut became_leader = false;
        if let Some(faction) = self.factions.get_mut(name) {
            faction.members.insert(agent.clone());
            faction.power = faction.power.saturating_add(1);
            if faction.leader.is_none() {
                faction.leader = Some(agent.clone());
                became_leader = true;
            }
        }
        self.membership.insert(agent.clone(), name.clone());
        self.log(name, FactionEventKind::MemberJoined, format!("{agent} joined {name}"), now);
        if became_leader {
            self.log(
                name,
                FactionEventKind::LeaderChanged,
                format!("{agent} now leads {name}"),
                now,
            );
        }
    }

    /// Whether any non-peace war record exists between the pair.
    pub(crate) fn in_conflict(&self, a: &FactionName, b: &FactionName) -> bool {
        self.wars
            .values()
            .any(|w| w.status.is_active() && w.is_between(a, b))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Thread-safe registry of factions.
///
/// The faction audit log is append-only and unbounded.
pub struct FactionRegistry {
    state: RwLock<RegistryState>,
    settings: FactionSettings,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for FactionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FactionRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FactionRegistry {
    /// An empty registry.
    pub fn new(settings: FactionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            settings,
            clock,
        }
    }

    /// Rebuild a registry from persisted records.
    ///
    /// The membership index is derived from the factions' member sets.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::InvalidSnapshot`] if an agent belongs to two
    /// factions, a leader is not a member, or a territory names an unknown
    /// owner.
    pub fn restore(
        settings: FactionSettings,
        clock: Arc<dyn Clock>,
        factions: Vec<Faction>,
        territories: Vec<Territory>,
        wars: Vec<War>,
        events: Vec<FactionEvent>,
    ) -> Result<Self, FactionError> {
        let mut state = RegistryState::default();
        for faction in factions {
            let stray_leader = faction
                .leader
                .as_ref()
                .filter(|l| !faction.members.contains(*l));
            if let Some(leader) = stray_leader {
                return Err(FactionError::InvalidSnapshot(format!(
                    "leader {leader} of {} is not a member",
                    faction.name
                )));
            }
            for member in &faction.members {
                if let Some(other) = state.membership.insert(member.clone(), faction.name.clone()) {
                    return Err(FactionError::InvalidSnapshot(format!(
                        "{member} belongs to both {other} and {}",
                        faction.name
                    )));
                }
            }
            state.factions.insert(faction.name.clone(), faction);
        }
        for territory in territories {
            if !state.factions.contains_key(&territory.faction) {
                return Err(FactionError::InvalidSnapshot(format!(
                    "territory {} owned by unknown faction {}",
                    territory.id, territory.faction
                )));
            }
            state.territories.insert(territory.id.clone(), territory);
        }
        state.wars = wars.into_iter().map(|w| (w.id, w)).collect();
        state.events = events;
        Ok(Self {
            state: RwLock::new(state),
            settings,
            clock,
        })
    }

    /// Active settings.
    pub const fn settings(&self) -> &FactionSettings {
        &self.settings
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, FactionError> {
        let Ok(guard) = self.state.read() else {
            return Err(FactionError::LockPoisoned("registry"));
        };
        Ok(guard)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, FactionError> {
        let Ok(guard) = self.state.write() else {
            return Err(FactionError::LockPoisoned("registry"));
        };
        Ok(guard)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Found a faction led by `founding.leader`, who leaves any previous faction.
    ///
    /// The new faction claims a home territory.
    ///
    /// # Errors
    ///
    /// - [`FactionError::DuplicateFaction`] if the name is taken.
    /// - [`FactionError::TerritoryUnavailable`] if no home can be placed.
    pub fn create_faction(
        &self,
        founding: NewFaction,
        rng: &mut impl Rng,
    ) -> Result<Faction, FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        self.create_locked(&mut state, founding, now, rng)
    }

    fn create_locked(
        &self,
        state: &mut RegistryState,
        founding: NewFaction,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Faction, FactionError> {
        if state.factions.contains_key(&founding.name) {
            return Err(FactionError::DuplicateFaction(founding.name));
        }
        let radius = self.settings.territory_radius;
        let center = find_free_center(
            state.territories.values(),
            radius,
            self.settings.world_extent,
            self.settings.claim_attempts,
            rng,
        )
        .ok_or_else(|| FactionError::TerritoryUnavailable(founding.name.clone()))?;

        state.detach(&founding.leader, now);

        let home_id = unique_id(format!("{}_home", slug(&founding.name)), &state.territories);
        let home = home_territory(home_id.clone(), founding.name.clone(), center, radius);
        let faction = Faction {
            name: founding.name.clone(),
            faction_type: founding.faction_type,
            leader: Some(founding.leader.clone()),
            members: BTreeSet::from([founding.leader.clone()]),
            treasury: self.settings.starting_treasury,
            reputation: 0,
            power: self.settings.starting_power,
            territories: vec![home_id.clone()],
            allies: BTreeSet::new(),
            enemies: BTreeSet::new(),
            created_at: now,
            description: founding.description,
            color: founding.color,
            motto: founding.motto,
        };
        state.territories.insert(home_id, home);
        state.membership.insert(founding.leader.clone(), founding.name.clone());
        state.factions.insert(founding.name.clone(), faction.clone());
        state.log(
            &founding.name,
            FactionEventKind::Created,
            format!("{} founded {} ({})", founding.leader, founding.name, founding.faction_type),
            now,
        );
        info!(faction = %founding.name, leader = %founding.leader, "faction created");
        Ok(faction)
    }

    /// Create the default factions if the registry is empty.
    ///
    /// Returns the number of factions created.
    ///
    /// # Errors
    ///
    /// Propagates [`FactionError::TerritoryUnavailable`] from placement.
    pub fn seed_defaults(&self, rng: &mut impl Rng) -> Result<usize, FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        if !state.factions.is_empty() {
            return Ok(0);
        }
        let seeds = default_factions();
        let count = seeds.len();
        for founding in seeds {
            self.create_locked(&mut state, founding, now, rng)?;
        }
        Ok(count)
    }

    /// Move `agent` into `faction`, leaving any previous faction first.
    ///
    /// Joining the current faction changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::UnknownFaction`] if `faction` does not exist.
    pub fn join(&self, agent: &AgentId, faction: &FactionName) -> Result<Faction, FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        let current = state.faction(faction)?.clone();
        if state.membership.get(agent) == Some(faction) {
            return Ok(current);
        }
        state.detach(agent, now);
        state.attach(agent, faction, now);
        Ok(state.faction(faction)?.clone())
    }

    /// Remove `agent` from its faction.
    ///
    /// Returns the faction left. The last member leaving makes the faction
    /// dormant; it is not deleted.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::NotAMember`] if the agent has no faction.
    pub fn leave(&self, agent: &AgentId) -> Result<FactionName, FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        state
            .detach(agent, now)
            .ok_or_else(|| FactionError::NotAMember(agent.clone()))
    }

    /// Claim an additional territory for `faction`.
    ///
    /// # Errors
    ///
    /// - [`FactionError::UnknownFaction`] if the faction does not exist.
    /// - [`FactionError::TerritoryUnavailable`] if every attempt overlaps.
    pub fn claim_territory(
        &self,
        faction: &FactionName,
        rng: &mut impl Rng,
    ) -> Result<Territory, FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        let owned = state.faction(faction)?.territories.len();
        let radius = self.settings.territory_radius;
        let center = find_free_center(
            state.territories.values(),
            radius,
            self.settings.world_extent,
            self.settings.claim_attempts,
            rng,
        )
        .ok_or_else(|| FactionError::TerritoryUnavailable(faction.clone()))?;

        let id = unique_id(format!("{}_outpost_{owned}", slug(faction)), &state.territories);
        let territory = outpost(id.clone(), faction.clone(), center, radius);
        state.faction_mut(faction)?.territories.push(id.clone());
        state.territories.insert(id.clone(), territory.clone());
        state.log(
            faction,
            FactionEventKind::TerritoryClaimed,
            format!("{faction} claimed {id} at ({}, {})", center.0, center.1),
            now,
        );
        Ok(territory)
    }

    /// Ally two factions.
    ///
    /// # Errors
    ///
    /// - [`FactionError::UnknownFaction`] if either is missing.
    /// - [`FactionError::SelfRelation`] if `a == b`.
    /// - [`FactionError::AtWar`] if an active war record exists between them.
    pub fn form_alliance(&self, a: &FactionName, b: &FactionName) -> Result<(), FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        state.faction(a)?;
        state.faction(b)?;
        if a == b {
            return Err(FactionError::SelfRelation(a.clone()));
        }
        if state.in_conflict(a, b) {
            return Err(FactionError::AtWar {
                a: a.clone(),
                b: b.clone(),
            });
        }
        let newly_formed = state.faction_mut(a)?.allies.insert(b.clone());
        state.faction_mut(b)?.allies.insert(a.clone());
        if newly_formed {
            let description = format!("{a} and {b} formed an alliance");
            state.log(a, FactionEventKind::AllianceFormed, description.clone(), now);
            state.log(b, FactionEventKind::AllianceFormed, description, now);
            info!(%a, %b, "alliance formed");
        }
        Ok(())
    }

    /// Dissolve an alliance. Breaking a non-existent alliance is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::UnknownFaction`] if either is missing.
    pub fn break_alliance(&self, a: &FactionName, b: &FactionName) -> Result<(), FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        state.faction(a)?;
        state.faction(b)?;
        let was_allied = state.faction_mut(a)?.allies.remove(b);
        state.faction_mut(b)?.allies.remove(a);
        if was_allied {
            let description = format!("{a} and {b} broke their alliance");
            state.log(a, FactionEventKind::AllianceBroken, description.clone(), now);
            state.log(b, FactionEventKind::AllianceBroken, description, now);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A faction by name.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn faction(&self, name: &FactionName) -> Result<Option<Faction>, FactionError> {
        Ok(self.read()?.factions.get(name).cloned())
    }

    /// The faction `agent` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn faction_of(&self, agent: &AgentId) -> Result<Option<FactionName>, FactionError> {
        Ok(self.read()?.membership.get(agent).cloned())
    }

    /// All factions ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn list_factions(&self) -> Result<Vec<Faction>, FactionError> {
        Ok(self.read()?.factions.values().cloned().collect())
    }

    /// Leaderboard ordered by power (descending), ties broken by name.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn rankings(&self) -> Result<Vec<FactionRanking>, FactionError> {
        let state = self.read()?;
        let mut factions: Vec<&Faction> = state.factions.values().collect();
        factions.sort_by(|x, y| y.power.cmp(&x.power).then_with(|| x.name.cmp(&y.name)));
        Ok(factions
            .into_iter()
            .zip(1_u32..)
            .map(|(f, rank)| FactionRanking {
                rank,
                name: f.name.clone(),
                faction_type: f.faction_type,
                power: f.power,
                members: u32::try_from(f.members.len()).unwrap_or(u32::MAX),
                treasury: f.treasury,
                reputation: f.reputation,
                territories: u32::try_from(f.territories.len()).unwrap_or(u32::MAX),
            })
            .collect())
    }

    /// All territories ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn territories(&self) -> Result<Vec<Territory>, FactionError> {
        Ok(self.read()?.territories.values().cloned().collect())
    }

    /// The whole audit log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn events(&self) -> Result<Vec<FactionEvent>, FactionError> {
        Ok(self.read()?.events.clone())
    }

    /// Audit-log entries filed under one faction, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn events_for(&self, faction: &FactionName) -> Result<Vec<FactionEvent>, FactionError> {
        Ok(self
            .read()?
            .events
            .iter()
            .filter(|e| &e.faction == faction)
            .cloned()
            .collect())
    }

    /// Reputation of the agent's faction on a `[-1, 1]` scale, or `None`
    /// when the agent has no faction.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn reputation_scale(&self, agent: &AgentId) -> Result<Option<Decimal>, FactionError> {
        let state = self.read()?;
        Ok(state
            .membership
            .get(agent)
            .and_then(|name| state.factions.get(name))
            .map(|f| Decimal::new(i64::from(f.reputation), 2)))
    }

    /// Append an audit-log entry under `faction` if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn record_event(
        &self,
        faction: &FactionName,
        kind: FactionEventKind,
        description: String,
    ) -> Result<(), FactionError> {
        let now = self.now();
        let mut state = self.write()?;
        if state.factions.contains_key(faction) {
            state.log(faction, kind, description, now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use clawcraft_types::{ManualClock, SystemClock};

    use super::*;

    fn registry() -> FactionRegistry {
        FactionRegistry::new(FactionSettings::default(), Arc::new(SystemClock))
    }

    fn found(registry: &FactionRegistry, name: &str, leader: &str, rng: &mut SmallRng) {
        let founding =
            NewFaction::new(FactionName::from(name), FactionType::Miners, AgentId::from(leader));
        assert!(registry.create_faction(founding, rng).is_ok());
    }

    /// Member sets and the reverse index must agree.
    fn assert_index_consistent(registry: &FactionRegistry) {
        let Ok(state) = registry.read() else {
            return;
        };
        let from_members: usize = state.factions.values().map(|f| f.members.len()).sum();
        assert_eq!(from_members, state.membership.len());
        for (agent, name) in &state.membership {
            assert!(state.factions.get(name).is_some_and(|f| f.members.contains(agent)));
        }
        for faction in state.factions.values() {
            match &faction.leader {
                Some(leader) => assert!(faction.members.contains(leader)),
                None => assert!(faction.members.is_empty()),
            }
        }
    }

    #[test]
    fn create_faction_sets_defaults_and_home() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(1);
        found(&registry, "Stone Wardens", "alice", &mut rng);

        let faction = registry.faction(&FactionName::from("Stone Wardens")).ok().flatten();
        assert!(faction.as_ref().is_some_and(|f| f.treasury == Decimal::new(500, 0)));
        assert!(faction.as_ref().is_some_and(|f| f.power == 10));
        assert!(faction.as_ref().is_some_and(|f| f.leader == Some(AgentId::from("alice"))));
        let territories = registry.territories().unwrap_or_default();
        assert_eq!(territories.len(), 1);
        assert!(territories.first().is_some_and(|t| t.id.as_str() == "stone_wardens_home"));
    }

    #[test]
    fn duplicate_faction_rejected() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(2);
        found(&registry, "A", "alice", &mut rng);
        let again =
            NewFaction::new(FactionName::from("A"), FactionType::Traders, AgentId::from("bob"));
        assert!(matches!(
            registry.create_faction(again, &mut rng),
            Err(FactionError::DuplicateFaction(_))
        ));
        assert_eq!(registry.faction_of(&AgentId::from("bob")).ok().flatten(), None);
    }

    #[test]
    fn founding_leaves_previous_faction() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(3);
        found(&registry, "A", "alice", &mut rng);
        assert!(registry.join(&AgentId::from("bob"), &FactionName::from("A")).is_ok());
        found(&registry, "B", "bob", &mut rng);

        assert_eq!(
            registry.faction_of(&AgentId::from("bob")).ok().flatten(),
            Some(FactionName::from("B"))
        );
        assert_index_consistent(&registry);
    }

    #[test]
    fn join_switches_faction_and_adjusts_power() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(4);
        found(&registry, "A", "alice", &mut rng);
        found(&registry, "B", "bob", &mut rng);
        let carol = AgentId::from("carol");

        assert!(registry.join(&carol, &FactionName::from("A")).is_ok());
        assert!(registry.join(&carol, &FactionName::from("A")).is_ok());
        let power_a = |r: &FactionRegistry| {
            r.faction(&FactionName::from("A")).ok().flatten().map(|f| f.power)
        };
        assert_eq!(power_a(&registry), Some(11));

        assert!(registry.join(&carol, &FactionName::from("B")).is_ok());
        assert_eq!(power_a(&registry), Some(10));
        assert_index_consistent(&registry);
    }

    #[test]
    fn join_unknown_faction_fails() {
        let registry = registry();
        assert!(matches!(
            registry.join(&AgentId::from("x"), &FactionName::from("nowhere")),
            Err(FactionError::UnknownFaction(_))
        ));
    }

    #[test]
    fn leader_handoff_and_dormancy() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(5);
        found(&registry, "A", "zed", &mut rng);
        let name = FactionName::from("A");
        assert!(registry.join(&AgentId::from("mia"), &name).is_ok());
        assert!(registry.join(&AgentId::from("bea"), &name).is_ok());

        assert!(registry.leave(&AgentId::from("zed")).is_ok());
        let leader = registry.faction(&name).ok().flatten().and_then(|f| f.leader);
        assert_eq!(leader, Some(AgentId::from("bea")));

        assert!(registry.leave(&AgentId::from("bea")).is_ok());
        assert!(registry.leave(&AgentId::from("mia")).is_ok());
        let faction = registry.faction(&name).ok().flatten();
        assert!(faction.as_ref().is_some_and(Faction::is_dormant));
        assert!(faction.as_ref().is_some_and(|f| f.leader.is_none()));

        assert!(registry.join(&AgentId::from("new"), &name).is_ok());
        let leader = registry.faction(&name).ok().flatten().and_then(|f| f.leader);
        assert_eq!(leader, Some(AgentId::from("new")));
        assert_index_consistent(&registry);
    }

    #[test]
    fn leave_without_faction_is_an_error() {
        assert!(matches!(
            registry().leave(&AgentId::from("drifter")),
            Err(FactionError::NotAMember(_))
        ));
    }

    #[test]
    fn power_floors_at_zero() {
        let settings = FactionSettings {
            starting_power: 0,
            ..FactionSettings::default()
        };
        let registry = FactionRegistry::new(settings, Arc::new(SystemClock));
        let mut rng = SmallRng::seed_from_u64(6);
        found(&registry, "A", "alice", &mut rng);
        assert!(registry.leave(&AgentId::from("alice")).is_ok());
        let power = registry.faction(&FactionName::from("A")).ok().flatten().map(|f| f.power);
        assert_eq!(power, Some(0));
    }

    #[test]
    fn rankings_order_by_power_then_name() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(7);
        found(&registry, "Beta", "b", &mut rng);
        found(&registry, "Alpha", "a", &mut rng);
        found(&registry, "Gamma", "g", &mut rng);
        assert!(registry.join(&AgentId::from("x"), &FactionName::from("Gamma")).is_ok());

        let names: Vec<String> = registry
            .rankings()
            .unwrap_or_default()
            .into_iter()
            .map(|r| format!("{}:{}", r.rank, r.name))
            .collect();
        assert_eq!(names, vec!["1:Gamma", "2:Alpha", "3:Beta"]);
    }

    #[test]
    fn claimed_territories_never_overlap() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(8);
        found(&registry, "A", "alice", &mut rng);
        for _ in 0..10 {
            assert!(registry.claim_territory(&FactionName::from("A"), &mut rng).is_ok());
        }
        let territories = registry.territories().unwrap_or_default();
        assert_eq!(territories.len(), 11);
        for (i, a) in territories.iter().enumerate() {
            for b in territories.iter().skip(i.saturating_add(1)) {
                assert!(!crate::territory::overlaps(
                    a.center_x, a.center_z, a.radius, b.center_x, b.center_z, b.radius
                ));
            }
        }
    }

    #[test]
    fn alliance_rules() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(9);
        found(&registry, "A", "alice", &mut rng);
        found(&registry, "B", "bob", &mut rng);
        let (a, b) = (FactionName::from("A"), FactionName::from("B"));

        assert!(matches!(registry.form_alliance(&a, &a), Err(FactionError::SelfRelation(_))));
        assert!(matches!(
            registry.form_alliance(&a, &FactionName::from("C")),
            Err(FactionError::UnknownFaction(_))
        ));
        assert!(registry.form_alliance(&a, &b).is_ok());
        assert!(registry.faction(&b).ok().flatten().is_some_and(|f| f.allies.contains(&a)));
        assert!(registry.break_alliance(&a, &b).is_ok());
        assert!(registry.faction(&a).ok().flatten().is_some_and(|f| f.allies.is_empty()));
    }

    #[test]
    fn seed_defaults_only_when_empty() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(10);
        assert_eq!(registry.seed_defaults(&mut rng).ok(), Some(5));
        assert_eq!(registry.seed_defaults(&mut rng).ok(), Some(0));
        assert_eq!(registry.list_factions().map(|f| f.len()).ok(), Some(5));
        assert_eq!(
            registry.faction_of(&AgentId::from("ShadowLord_AI")).ok().flatten(),
            Some(FactionName::from("Shadow Clan"))
        );
    }

    #[test]
    fn reputation_scale_is_hundredths() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(11);
        found(&registry, "A", "alice", &mut rng);
        if let Ok(mut state) = registry.write() {
            state.adjust_reputation(&FactionName::from("A"), 250);
        }
        assert_eq!(
            registry.reputation_scale(&AgentId::from("alice")).ok(),
            Some(Some(Decimal::ONE))
        );
        assert_eq!(registry.reputation_scale(&AgentId::from("nobody")).ok(), Some(None));
    }

    #[test]
    fn events_are_timestamped_by_the_clock() {
        let start = chrono::DateTime::<Utc>::UNIX_EPOCH;
        let clock = Arc::new(ManualClock::new(start));
        let registry = FactionRegistry::new(FactionSettings::default(), clock);
        let mut rng = SmallRng::seed_from_u64(12);
        found(&registry, "A", "alice", &mut rng);
        let events = registry.events_for(&FactionName::from("A")).unwrap_or_default();
        assert!(events.iter().all(|e| e.timestamp == start));
        assert!(events.iter().any(|e| e.kind == FactionEventKind::Created));
    }

    #[test]
    fn restore_rejects_double_membership() {
        let registry = registry();
        let mut rng = SmallRng::seed_from_u64(13);
        found(&registry, "A", "alice", &mut rng);
        found(&registry, "B", "bob", &mut rng);
        let mut factions = registry.list_factions().unwrap_or_default();
        for f in &mut factions {
            f.members.insert(AgentId::from("spy"));
        }
        let restored = FactionRegistry::restore(
            FactionSettings::default(),
            Arc::new(SystemClock),
            factions,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(restored, Err(FactionError::InvalidSnapshot(_))));
    }
}
