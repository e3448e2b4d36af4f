//! Conflict engine: wars between factions and bounties on agents.
//!
//! War state lives inside the [`FactionRegistry`] so that scoring and
//! settlement happen under the registry lock. Bounties live on a separate
//! [`BountyBoard`]; the engine logs bounty activity into the faction audit
//! log of whoever is involved.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use clawcraft_types::{
    AgentId, Bounty, BountyId, Clock, Faction, FactionEvent, FactionEventKind, FactionName,
    Territory, War, WarId,
};

use crate::bounty::{BountyBoard, BountyClaim};
use crate::error::FactionError;
use crate::registry::{FactionRegistry, FactionSettings};
use crate::war::KillReport;

/// Scoring, settlement and bounty constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictSettings {
    /// Kills needed by one side to win a war.
    pub victory_threshold: u32,
    /// Share of the loser's treasury paid to the winner.
    pub war_stakes: Decimal,
    /// Power gained by the winner.
    pub victory_power: u32,
    /// Power lost by the loser.
    pub defeat_power: u32,
    /// Reputation gained by the killer's faction per qualifying kill.
    pub kill_reputation: i32,
    /// Reputation lost by the victim's faction per qualifying kill.
    pub death_reputation: i32,
    /// Lifetime of a bounty when the issuer gives none.
    pub bounty_ttl_hours: i64,
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self {
            victory_threshold: 10,
            war_stakes: Decimal::new(10, 2),
            victory_power: 5,
            defeat_power: 3,
            kill_reputation: 2,
            death_reputation: 1,
            bounty_ttl_hours: 24,
        }
    }
}

impl ConflictSettings {
    /// Default bounty lifetime.
    pub fn bounty_ttl(&self) -> Duration {
        Duration::hours(self.bounty_ttl_hours)
    }
}

/// Everything needed to rebuild the faction world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSnapshot {
    /// Every faction, dormant ones included.
    pub factions: Vec<Faction>,
    /// Every claimed territory.
    pub territories: Vec<Territory>,
    /// Every war record, finished ones included.
    pub wars: Vec<War>,
    /// Every bounty, claimed and expired ones included.
    pub bounties: Vec<Bounty>,
    /// The audit log, oldest first.
    pub events: Vec<FactionEvent>,
}

/// Wars and bounties over a shared [`FactionRegistry`].
#[derive(Debug)]
pub struct ConflictEngine {
    registry: Arc<FactionRegistry>,
    bounties: BountyBoard,
    settings: ConflictSettings,
}

impl ConflictEngine {
    /// An engine with an empty bounty board.
    pub fn new(registry: Arc<FactionRegistry>, settings: ConflictSettings) -> Self {
        Self {
            registry,
            bounties: BountyBoard::new(),
            settings,
        }
    }

    /// Rebuild registry, wars and bounties from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::InvalidSnapshot`] for contradictory records.
    pub fn restore(
        faction_settings: FactionSettings,
        settings: ConflictSettings,
        clock: Arc<dyn Clock>,
        snapshot: FactionSnapshot,
    ) -> Result<Self, FactionError> {
        let registry = FactionRegistry::restore(
            faction_settings,
            clock,
            snapshot.factions,
            snapshot.territories,
            snapshot.wars,
            snapshot.events,
        )?;
        Ok(Self {
            registry: Arc::new(registry),
            bounties: BountyBoard::restore(snapshot.bounties),
            settings,
        })
    }

    /// The registry this engine works on.
    pub fn registry(&self) -> &Arc<FactionRegistry> {
        &self.registry
    }

    /// Active settings.
    pub const fn settings(&self) -> &ConflictSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Wars
    // -----------------------------------------------------------------------

    /// Declare war from `a` on `b`, escalating an existing tension record.
    ///
    /// # Errors
    ///
    /// - [`FactionError::UnknownFaction`] if either faction is missing.
    /// - [`FactionError::SelfRelation`] if `a == b`.
    /// - [`FactionError::AlreadyAtWar`] if the pair is already at war or in
    ///   armistice.
    pub fn declare_war(
        &self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
    ) -> Result<War, FactionError> {
        let now = self.registry.now();
        self.registry
            .write()?
            .declare_war(a, b, reason, &self.settings, now)
    }

    /// Open a tension record between `a` and `b`.
    ///
    /// # Errors
    ///
    /// Same as [`declare_war`](Self::declare_war), with
    /// [`FactionError::AlreadyAtWar`] for any existing active record.
    pub fn raise_tension(
        &self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
    ) -> Result<War, FactionError> {
        let now = self.registry.now();
        self.registry
            .write()?
            .raise_tension(a, b, reason, &self.settings, now)
    }

    /// `War -> Armistice`. Kills stop scoring.
    ///
    /// # Errors
    ///
    /// [`FactionError::WarNotFound`] or [`FactionError::InvalidWarTransition`].
    pub fn call_armistice(&self, war: WarId) -> Result<War, FactionError> {
        let now = self.registry.now();
        self.registry.write()?.call_armistice(war, now)
    }

    /// `Armistice -> War`.
    ///
    /// # Errors
    ///
    /// [`FactionError::WarNotFound`] or [`FactionError::InvalidWarTransition`].
    pub fn resume_war(&self, war: WarId) -> Result<War, FactionError> {
        let now = self.registry.now();
        self.registry.write()?.resume_war(war, now)
    }

    /// End any active record without settlement.
    ///
    /// # Errors
    ///
    /// [`FactionError::WarNotFound`] or [`FactionError::InvalidWarTransition`].
    pub fn make_peace(&self, war: WarId) -> Result<War, FactionError> {
        let now = self.registry.now();
        self.registry.write()?.make_peace(war, now)
    }

    /// Apply a PvP kill to reputation and any running war.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::ArithmeticOverflow`] if settlement overflows.
    pub fn record_kill(
        &self,
        killer: &AgentId,
        victim: &AgentId,
    ) -> Result<KillReport, FactionError> {
        let now = self.registry.now();
        let report = self
            .registry
            .write()?
            .record_kill(killer, victim, &self.settings, now)?;
        debug!(%killer, %victim, qualifying = report.is_qualifying(), "kill recorded");
        Ok(report)
    }

    /// A war record by id.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn war(&self, id: WarId) -> Result<Option<War>, FactionError> {
        Ok(self.registry.read()?.wars.get(&id).cloned())
    }

    /// Every war record, ordered by id (and therefore by creation).
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn wars(&self) -> Result<Vec<War>, FactionError> {
        Ok(self.registry.read()?.wars.values().cloned().collect())
    }

    /// Records in `Tension`, `War` or `Armistice`.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the registry lock is poisoned.
    pub fn active_wars(&self) -> Result<Vec<War>, FactionError> {
        Ok(self
            .registry
            .read()?
            .wars
            .values()
            .filter(|w| w.status.is_active())
            .cloned()
            .collect())
    }

    // -----------------------------------------------------------------------
    // Bounties
    // -----------------------------------------------------------------------

    /// Post a bounty. Bounties from anyone but `system` are marked as
    /// escrowed; the caller is responsible for locking the funds.
    ///
    /// # Errors
    ///
    /// - [`FactionError::InvalidAmount`] for a non-positive amount.
    /// - [`FactionError::InvalidDuration`] for a non-positive lifetime.
    pub fn issue_bounty(
        &self,
        issuer: &AgentId,
        target: &AgentId,
        amount: Decimal,
        reason: &str,
        ttl: Duration,
    ) -> Result<Bounty, FactionError> {
        let now = self.registry.now();
        let bounty = self
            .bounties
            .issue(issuer, target, amount, reason, ttl, !issuer.is_system(), now)?;

        if let Some(faction) = self.registry.faction_of(issuer)? {
            self.registry.record_event(
                &faction,
                FactionEventKind::BountyIssued,
                format!("{issuer} put {amount} on {target}: {reason}"),
            )?;
        }
        if let Some(faction) = self.registry.faction_of(target)? {
            self.registry.record_event(
                &faction,
                FactionEventKind::BountyReceived,
                format!("{target} has a bounty of {amount}: {reason}"),
            )?;
        }
        info!(bounty = %bounty.id, %issuer, %target, %amount, "bounty issued");
        Ok(bounty)
    }

    /// Claim a bounty. Does not move money.
    ///
    /// # Errors
    ///
    /// [`FactionError::NotFound`] or [`FactionError::AlreadyClaimed`].
    pub fn claim_bounty(
        &self,
        id: BountyId,
        claimer: &AgentId,
    ) -> Result<BountyClaim, FactionError> {
        let claim = self.bounties.claim(id, claimer, self.registry.now())?;
        if let Some(faction) = self.registry.faction_of(claimer)? {
            self.registry.record_event(
                &faction,
                FactionEventKind::BountyClaimed,
                format!("{claimer} collected {} on {}", claim.amount, claim.bounty.target),
            )?;
        }
        info!(bounty = %id, %claimer, amount = %claim.amount, "bounty claimed");
        Ok(claim)
    }

    /// Make a claimed bounty claimable again after its payout failed.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::NotFound`] for an unknown bounty, or
    /// [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn reopen_bounty(&self, id: BountyId, claimer: &AgentId) -> Result<bool, FactionError> {
        let reopened = self.bounties.reopen(id, claimer)?;
        if reopened {
            warn!(bounty = %id, %claimer, "bounty claim reopened");
        }
        Ok(reopened)
    }

    /// Deactivate overdue bounties and return them.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if a lock is poisoned.
    pub fn expire_bounties(&self) -> Result<Vec<Bounty>, FactionError> {
        let expired = self.bounties.expire_due(self.registry.now())?;
        for bounty in &expired {
            if let Some(faction) = self.registry.faction_of(&bounty.target)? {
                self.registry.record_event(
                    &faction,
                    FactionEventKind::BountyExpired,
                    format!("bounty of {} on {} expired", bounty.amount, bounty.target),
                )?;
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "bounties expired");
        }
        Ok(expired)
    }

    /// Claimable bounties.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn active_bounties(&self) -> Result<Vec<Bounty>, FactionError> {
        self.bounties.active(self.registry.now())
    }

    /// Claimable bounties on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn bounties_on(&self, target: &AgentId) -> Result<Vec<Bounty>, FactionError> {
        self.bounties.active_on(target, self.registry.now())
    }

    /// A bounty by id.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn bounty(&self, id: BountyId) -> Result<Option<Bounty>, FactionError> {
        self.bounties.get(id)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Copy out the whole faction world.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if a lock is poisoned.
    pub fn snapshot(&self) -> Result<FactionSnapshot, FactionError> {
        let state = self.registry.read()?;
        Ok(FactionSnapshot {
            factions: state.factions.values().cloned().collect(),
            territories: state.territories.values().cloned().collect(),
            wars: state.wars.values().cloned().collect(),
            bounties: self.bounties.all()?,
            events: state.events.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use clawcraft_types::{FactionType, ManualClock, WarStatus};

    use super::*;
    use crate::registry::NewFaction;

    struct World {
        engine: ConflictEngine,
        clock: Arc<ManualClock>,
        red: FactionName,
        blue: FactionName,
    }

    fn world() -> World {
        let clock = Arc::new(ManualClock::new(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH));
        let registry = Arc::new(FactionRegistry::new(FactionSettings::default(), clock.clone()));
        let mut rng = SmallRng::seed_from_u64(42);
        for (name, leader) in [("Red", "r0"), ("Blue", "b0")] {
            let founding = NewFaction::new(
                FactionName::from(name),
                FactionType::Warriors,
                AgentId::from(leader),
            );
            registry.create_faction(founding, &mut rng).unwrap();
        }
        World {
            engine: ConflictEngine::new(registry, ConflictSettings::default()),
            clock,
            red: FactionName::from("Red"),
            blue: FactionName::from("Blue"),
        }
    }

    fn faction(w: &World, name: &FactionName) -> Faction {
        w.engine.registry().faction(name).unwrap().unwrap()
    }

    fn kinds(w: &World, name: &FactionName) -> Vec<FactionEventKind> {
        w.engine
            .registry()
            .events_for(name)
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect()
    }

    fn enemies_match_active_wars(w: &World) -> bool {
        let active = w.engine.active_wars().unwrap();
        w.engine.registry().list_factions().unwrap().iter().all(|f| {
            f.enemies.iter().all(|e| active.iter().any(|war| war.is_between(&f.name, e)))
                && active
                    .iter()
                    .filter_map(|war| war.opponent_of(&f.name))
                    .all(|opp| f.enemies.contains(opp))
        })
    }

    #[test]
    fn declare_war_marks_enemies_and_breaks_alliance() {
        let w = world();
        w.engine.registry().form_alliance(&w.red, &w.blue).unwrap();
        let war = w.engine.declare_war(&w.red, &w.blue, "border raid").unwrap();

        assert_eq!(war.status, WarStatus::War);
        assert_eq!(war.stakes, Decimal::new(10, 2));
        let red = faction(&w, &w.red);
        assert!(red.enemies.contains(&w.blue));
        assert!(red.allies.is_empty());
        assert!(enemies_match_active_wars(&w));
    }

    #[test]
    fn declare_war_validation() {
        let w = world();
        assert!(matches!(
            w.engine.declare_war(&w.red, &w.red, "civil"),
            Err(FactionError::SelfRelation(_))
        ));
        assert!(matches!(
            w.engine.declare_war(&w.red, &FactionName::from("Green"), "x"),
            Err(FactionError::UnknownFaction(_))
        ));
        w.engine.declare_war(&w.red, &w.blue, "first").unwrap();
        assert!(matches!(
            w.engine.declare_war(&w.blue, &w.red, "again"),
            Err(FactionError::AlreadyAtWar { .. })
        ));
        assert!(matches!(
            w.engine.registry().form_alliance(&w.red, &w.blue),
            Err(FactionError::AtWar { .. })
        ));
    }

    #[test]
    fn tension_escalates_to_war() {
        let w = world();
        let tension = w.engine.raise_tension(&w.red, &w.blue, "insults").unwrap();
        assert_eq!(tension.status, WarStatus::Tension);
        assert!(matches!(
            w.engine.raise_tension(&w.blue, &w.red, "more insults"),
            Err(FactionError::AlreadyAtWar { .. })
        ));

        let war = w.engine.declare_war(&w.blue, &w.red, "enough").unwrap();
        assert_eq!(war.id, tension.id);
        assert_eq!(war.status, WarStatus::War);
        assert_eq!(w.engine.active_wars().unwrap().len(), 1);
    }

    #[test]
    fn lifecycle_transitions() {
        let w = world();
        let war = w.engine.declare_war(&w.red, &w.blue, "x").unwrap();

        assert!(matches!(
            w.engine.resume_war(war.id),
            Err(FactionError::InvalidWarTransition { status: WarStatus::War, .. })
        ));
        assert_eq!(w.engine.call_armistice(war.id).unwrap().status, WarStatus::Armistice);
        assert_eq!(w.engine.resume_war(war.id).unwrap().status, WarStatus::War);

        let peace = w.engine.make_peace(war.id).unwrap();
        assert_eq!(peace.status, WarStatus::Peace);
        assert!(peace.ended_at.is_some());
        assert!(peace.winner.is_none());
        assert!(faction(&w, &w.red).enemies.is_empty());
        assert!(matches!(
            w.engine.make_peace(war.id),
            Err(FactionError::InvalidWarTransition { .. })
        ));
        assert!(matches!(
            w.engine.call_armistice(WarId::new()),
            Err(FactionError::WarNotFound(_))
        ));
        assert!(enemies_match_active_wars(&w));
    }

    #[test]
    fn kills_adjust_reputation_without_war() {
        let w = world();
        let report = w.engine.record_kill(&AgentId::from("r0"), &AgentId::from("b0")).unwrap();
        assert!(report.is_qualifying());
        assert!(report.scored_war.is_none());
        assert_eq!(faction(&w, &w.red).reputation, 2);
        assert_eq!(faction(&w, &w.blue).reputation, -1);

        let lone = w.engine.record_kill(&AgentId::from("r0"), &AgentId::from("stranger")).unwrap();
        assert!(!lone.is_qualifying());
        assert_eq!(faction(&w, &w.red).reputation, 2);
    }

    #[test]
    fn reputation_is_clamped() {
        let w = world();
        for _ in 0..80 {
            w.engine.record_kill(&AgentId::from("r0"), &AgentId::from("b0")).unwrap();
        }
        assert_eq!(faction(&w, &w.red).reputation, 100);
        assert_eq!(faction(&w, &w.blue).reputation, -80);
    }

    #[test]
    fn armistice_stops_scoring() {
        let w = world();
        let war = w.engine.declare_war(&w.red, &w.blue, "x").unwrap();
        w.engine.call_armistice(war.id).unwrap();
        let report = w.engine.record_kill(&AgentId::from("r0"), &AgentId::from("b0")).unwrap();
        assert!(report.scored_war.is_none());
        assert_eq!(w.engine.war(war.id).unwrap().map(|w| w.score_a), Some(0));
    }

    #[test]
    fn victory_at_threshold_settles_stakes() {
        let w = world();
        let war = w.engine.declare_war(&w.blue, &w.red, "x").unwrap();
        let (killer, victim) = (AgentId::from("r0"), AgentId::from("b0"));

        for _ in 0..9 {
            let report = w.engine.record_kill(&killer, &victim).unwrap();
            assert!(report.victory.is_none());
        }
        let at_nine = w.engine.war(war.id).unwrap().unwrap();
        assert_eq!(at_nine.score_b, 9);
        assert_eq!(at_nine.status, WarStatus::War);

        let report = w.engine.record_kill(&killer, &victim).unwrap();
        let victory = report.victory.unwrap();
        assert_eq!(victory.winner, w.red);
        assert_eq!(victory.spoils, Decimal::new(50, 0));

        let ended = w.engine.war(war.id).unwrap().unwrap();
        assert_eq!(ended.status, WarStatus::Peace);
        assert_eq!(ended.winner, Some(w.red.clone()));
        assert!(ended.ended_at.is_some());

        let red = faction(&w, &w.red);
        let blue = faction(&w, &w.blue);
        assert_eq!(red.treasury, Decimal::new(550, 0));
        assert_eq!(blue.treasury, Decimal::new(450, 0));
        assert_eq!(red.power, 15);
        assert_eq!(blue.power, 7);
        assert!(red.enemies.is_empty() && blue.enemies.is_empty());

        assert!(kinds(&w, &w.red).contains(&FactionEventKind::WarWon));
        assert!(kinds(&w, &w.blue).contains(&FactionEventKind::WarLost));

        // A finished war no longer scores.
        let after = w.engine.record_kill(&killer, &victim).unwrap();
        assert!(after.scored_war.is_none());
    }

    #[test]
    fn bounty_lifecycle_with_events() {
        let w = world();
        let issuer = AgentId::from("r0");
        let target = AgentId::from("b0");
        let ttl = w.engine.settings().bounty_ttl();
        let bounty = w
            .engine
            .issue_bounty(&issuer, &target, Decimal::new(40, 0), "revenge", ttl)
            .unwrap();
        assert!(bounty.escrowed);
        assert_eq!(w.engine.bounties_on(&target).unwrap().len(), 1);

        let claim = w.engine.claim_bounty(bounty.id, &AgentId::from("r0")).unwrap();
        assert_eq!(claim.amount, Decimal::new(40, 0));
        assert!(w.engine.active_bounties().unwrap().is_empty());

        let red_events = kinds(&w, &w.red);
        assert!(red_events.contains(&FactionEventKind::BountyIssued));
        assert!(red_events.contains(&FactionEventKind::BountyClaimed));
        assert!(kinds(&w, &w.blue).contains(&FactionEventKind::BountyReceived));
    }

    #[test]
    fn system_bounty_expires_on_clock() {
        let w = world();
        let bounty = w
            .engine
            .issue_bounty(
                &AgentId::system(),
                &AgentId::from("b0"),
                Decimal::new(5, 0),
                "wanted",
                Duration::hours(1),
            )
            .unwrap();
        assert!(!bounty.escrowed);

        w.clock.advance(Duration::minutes(59));
        assert!(w.engine.expire_bounties().unwrap().is_empty());
        w.clock.advance(Duration::minutes(1));
        let expired = w.engine.expire_bounties().unwrap();
        assert_eq!(expired.len(), 1);
        assert!(matches!(
            w.engine.claim_bounty(bounty.id, &AgentId::from("r0")),
            Err(FactionError::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_restores_equivalent_world() {
        let w = world();
        w.engine.declare_war(&w.red, &w.blue, "x").unwrap();
        w.engine
            .issue_bounty(
                &AgentId::system(),
                &AgentId::from("b0"),
                Decimal::ONE,
                "y",
                Duration::hours(2),
            )
            .unwrap();
        let snapshot = w.engine.snapshot().unwrap();

        let restored = ConflictEngine::restore(
            FactionSettings::default(),
            ConflictSettings::default(),
            w.clock.clone(),
            snapshot.clone(),
        )
        .unwrap();
        assert_eq!(restored.snapshot().unwrap(), snapshot);
        assert_eq!(
            restored.registry().faction_of(&AgentId::from("b0")).unwrap(),
            Some(w.blue.clone())
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: FactionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
