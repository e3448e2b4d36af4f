//! War lifecycle and kill scoring.
//!
//! ```text
//!            raise_tension          declare_war
//!   (none) ───────────────► Tension ───────────► War ◄──── resume_war ───┐
//!      │                                          │                      │
//!      └──────────── declare_war ─────────────────┘  call_armistice ─► Armistice
//!
//!   make_peace: any active state ─► Peace
//!   victory threshold reached in War ─► Peace (with stake settlement)
//! ```
//!
//! These run on the locked [`RegistryState`] so that scoring, treasury
//! settlement and the `enemies` sets change together.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::info;

use clawcraft_types::{AgentId, FactionEventKind, FactionName, War, WarId, WarStatus};

use crate::conflict::ConflictSettings;
use crate::error::FactionError;
use crate::registry::RegistryState;

/// Outcome of a war reaching its victory threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarVictory {
    /// The finished war.
    pub war: WarId,
    /// Winning faction.
    pub winner: FactionName,
    /// Losing faction.
    pub loser: FactionName,
    /// Treasury moved from loser to winner.
    pub spoils: Decimal,
}

/// What a PvP kill changed in the faction world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReport {
    /// Killer's faction at the time of the kill.
    pub killer_faction: Option<FactionName>,
    /// Victim's faction at the time of the kill.
    pub victim_faction: Option<FactionName>,
    /// War whose score was incremented, if any.
    pub scored_war: Option<WarId>,
    /// Set when the kill ended a war.
    pub victory: Option<WarVictory>,
}

impl KillReport {
    /// Both agents were in factions, and in different ones.
    pub fn is_qualifying(&self) -> bool {
        matches!(
            (&self.killer_faction, &self.victim_faction),
            (Some(k), Some(v)) if k != v
        )
    }
}

impl RegistryState {
    fn active_war_id(&self, a: &FactionName, b: &FactionName) -> Option<WarId> {
        self.wars
            .values()
            .find(|w| w.status.is_active() && w.is_between(a, b))
            .map(|w| w.id)
    }

    fn check_pair(&self, a: &FactionName, b: &FactionName) -> Result<(), FactionError> {
        self.faction(a)?;
        self.faction(b)?;
        if a == b {
            return Err(FactionError::SelfRelation(a.clone()));
        }
        Ok(())
    }

    /// Put each faction in the other's `enemies` and break any alliance.
    fn mark_hostile(&mut self, a: &FactionName, b: &FactionName, now: DateTime<Utc>) {
        let mut broke_alliance = false;
        if let Some(f) = self.factions.get_mut(a) {
            f.enemies.insert(b.clone());
            broke_alliance |= f.allies.remove(b);
        }
        if let Some(f) = self.factions.get_mut(b) {
            f.enemies.insert(a.clone());
            broke_alliance |= f.allies.remove(a);
        }
        if broke_alliance {
            let description = format!("alliance between {a} and {b} collapsed");
            self.log(a, FactionEventKind::AllianceBroken, description.clone(), now);
            self.log(b, FactionEventKind::AllianceBroken, description, now);
        }
    }

    fn clear_hostility(&mut self, a: &FactionName, b: &FactionName) {
        if let Some(f) = self.factions.get_mut(a) {
            f.enemies.remove(b);
        }
        if let Some(f) = self.factions.get_mut(b) {
            f.enemies.remove(a);
        }
    }

    fn log_both(
        &mut self,
        war: &War,
        kind: FactionEventKind,
        description: &str,
        now: DateTime<Utc>,
    ) {
        let (a, b) = (war.faction_a.clone(), war.faction_b.clone());
        self.log(&a, kind, description.to_owned(), now);
        self.log(&b, kind, description.to_owned(), now);
    }

    fn open_war(
        &mut self,
        a: &FactionName,
        b: &FactionName,
        status: WarStatus,
        reason: &str,
        stakes: Decimal,
        now: DateTime<Utc>,
    ) -> War {
        let war = War {
            id: WarId::new(),
            faction_a: a.clone(),
            faction_b: b.clone(),
            status,
            score_a: 0,
            score_b: 0,
            reason: reason.to_owned(),
            stakes,
            started_at: now,
            ended_at: None,
            winner: None,
        };
        self.wars.insert(war.id, war.clone());
        self.mark_hostile(a, b, now);
        war
    }

    pub(crate) fn declare_war(
        &mut self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
        settings: &ConflictSettings,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        self.check_pair(a, b)?;
        let war = match self.active_war_id(a, b) {
            Some(id) => {
                let Some(existing) = self.wars.get_mut(&id) else {
                    return Err(FactionError::WarNotFound(id));
                };
                if existing.status != WarStatus::Tension {
                    return Err(FactionError::AlreadyAtWar {
                        a: a.clone(),
                        b: b.clone(),
                    });
                }
                existing.status = WarStatus::War;
                existing.clone()
            }
            None => self.open_war(a, b, WarStatus::War, reason, settings.war_stakes, now),
        };
        let description = format!("{a} declared war on {b}: {reason}");
        self.log_both(&war, FactionEventKind::WarDeclared, &description, now);
        info!(war = %war.id, attacker = %a, defender = %b, "war declared");
        Ok(war)
    }

    pub(crate) fn raise_tension(
        &mut self,
        a: &FactionName,
        b: &FactionName,
        reason: &str,
        settings: &ConflictSettings,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        self.check_pair(a, b)?;
        if self.active_war_id(a, b).is_some() {
            return Err(FactionError::AlreadyAtWar {
                a: a.clone(),
                b: b.clone(),
            });
        }
        let war = self.open_war(a, b, WarStatus::Tension, reason, settings.war_stakes, now);
        let description = format!("tension between {a} and {b}: {reason}");
        self.log_both(&war, FactionEventKind::TensionRaised, &description, now);
        info!(war = %war.id, %a, %b, "tension raised");
        Ok(war)
    }

    /// Move a war from one of `from` to `to`.
    fn transition(
        &mut self,
        id: WarId,
        action: &'static str,
        from: &[WarStatus],
        to: WarStatus,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        let Some(war) = self.wars.get_mut(&id) else {
            return Err(FactionError::WarNotFound(id));
        };
        if !from.contains(&war.status) {
            return Err(FactionError::InvalidWarTransition {
                war: id,
                status: war.status,
                action,
            });
        }
        war.status = to;
        if to == WarStatus::Peace {
            war.ended_at = Some(now);
        }
        Ok(war.clone())
    }

    pub(crate) fn call_armistice(
        &mut self,
        id: WarId,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        let war = self.transition(
            id,
            "call an armistice",
            &[WarStatus::War],
            WarStatus::Armistice,
            now,
        )?;
        let description = format!("armistice between {} and {}", war.faction_a, war.faction_b);
        self.log_both(&war, FactionEventKind::ArmisticeCalled, &description, now);
        info!(war = %id, "armistice called");
        Ok(war)
    }

    pub(crate) fn resume_war(
        &mut self,
        id: WarId,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        let war = self.transition(id, "resume", &[WarStatus::Armistice], WarStatus::War, now)?;
        let description = format!("war between {} and {} resumed", war.faction_a, war.faction_b);
        self.log_both(&war, FactionEventKind::WarResumed, &description, now);
        info!(war = %id, "war resumed");
        Ok(war)
    }

    pub(crate) fn make_peace(
        &mut self,
        id: WarId,
        now: DateTime<Utc>,
    ) -> Result<War, FactionError> {
        let war = self.transition(
            id,
            "make peace",
            &[WarStatus::Tension, WarStatus::War, WarStatus::Armistice],
            WarStatus::Peace,
            now,
        )?;
        self.clear_hostility(&war.faction_a, &war.faction_b);
        let description = format!("{} and {} made peace", war.faction_a, war.faction_b);
        self.log_both(&war, FactionEventKind::PeaceMade, &description, now);
        info!(war = %id, "peace made");
        Ok(war)
    }

    pub(crate) fn record_kill(
        &mut self,
        killer: &AgentId,
        victim: &AgentId,
        settings: &ConflictSettings,
        now: DateTime<Utc>,
    ) -> Result<KillReport, FactionError> {
        let mut report = KillReport {
            killer_faction: self.membership.get(killer).cloned(),
            victim_faction: self.membership.get(victim).cloned(),
            ..KillReport::default()
        };
        let (Some(kf), Some(vf)) = (report.killer_faction.clone(), report.victim_faction.clone())
        else {
            return Ok(report);
        };
        if kf == vf {
            return Ok(report);
        }

        self.adjust_reputation(&kf, settings.kill_reputation);
        self.adjust_reputation(&vf, settings.death_reputation.saturating_neg());

        let Some(war) = self
            .wars
            .values_mut()
            .find(|w| w.status == WarStatus::War && w.is_between(&kf, &vf))
        else {
            return Ok(report);
        };
        let score = if war.faction_a == kf {
            war.score_a = war.score_a.saturating_add(1);
            war.score_a
        } else {
            war.score_b = war.score_b.saturating_add(1);
            war.score_b
        };
        let war_id = war.id;
        report.scored_war = Some(war_id);

        if score >= settings.victory_threshold {
            report.victory = Some(self.settle_victory(war_id, &kf, &vf, settings, now)?);
        }
        Ok(report)
    }

    /// End a war in the winner's favour and move the stakes.
    fn settle_victory(
        &mut self,
        war_id: WarId,
        winner: &FactionName,
        loser: &FactionName,
        settings: &ConflictSettings,
        now: DateTime<Utc>,
    ) -> Result<WarVictory, FactionError> {
        let stakes = self
            .wars
            .get(&war_id)
            .map_or(settings.war_stakes, |w| w.stakes);
        let loser_treasury = self.faction(loser)?.treasury;
        let winner_treasury = self.faction(winner)?.treasury;
        let spoils = loser_treasury
            .checked_mul(stakes)
            .ok_or(FactionError::ArithmeticOverflow)?
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
            .max(Decimal::ZERO);
        let loser_after = loser_treasury
            .checked_sub(spoils)
            .ok_or(FactionError::ArithmeticOverflow)?;
        let winner_after = winner_treasury
            .checked_add(spoils)
            .ok_or(FactionError::ArithmeticOverflow)?;

        let w = self.faction_mut(winner)?;
        w.treasury = winner_after;
        w.power = w.power.saturating_add(settings.victory_power);
        let l = self.faction_mut(loser)?;
        l.treasury = loser_after;
        l.power = l.power.saturating_sub(settings.defeat_power);

        if let Some(war) = self.wars.get_mut(&war_id) {
            war.status = WarStatus::Peace;
            war.ended_at = Some(now);
            war.winner = Some(winner.clone());
        }
        self.clear_hostility(winner, loser);
        self.log(
            winner,
            FactionEventKind::WarWon,
            format!("{winner} defeated {loser} and took {spoils}"),
            now,
        );
        self.log(
            loser,
            FactionEventKind::WarLost,
            format!("{loser} lost the war to {winner} and paid {spoils}"),
            now,
        );
        info!(war = %war_id, %winner, %loser, %spoils, "war won");
        Ok(WarVictory {
            war: war_id,
            winner: winner.clone(),
            loser: loser.clone(),
            spoils,
        })
    }
}
