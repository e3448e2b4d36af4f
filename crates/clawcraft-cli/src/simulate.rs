//! Randomised concurrent load against a [`GameEconomy`].
//!
//! Each worker thread draws game events from its own seeded RNG and fires
//! them at the shared economy; the run ends with a conservation audit.

use std::thread;

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use clawcraft_core::{CoreError, GameEconomy};
use clawcraft_ledger::ConservationResult;
use clawcraft_types::{AgentId, EconomyStats, OreType};

use crate::cli::SimulateArgs;
use crate::error::CliError;

/// Summary of a simulation run.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Seed the workers derived their RNGs from.
    pub seed: u64,
    /// Simulated agents.
    pub agents: usize,
    /// Worker threads.
    pub workers: usize,
    /// Events the economy accepted.
    pub accepted: usize,
    /// Events the economy rejected.
    pub rejected: usize,
    /// Economy statistics after the run.
    pub stats: EconomyStats,
    /// Conservation audit after the run.
    pub audit: ConservationResult,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    accepted: usize,
    rejected: usize,
}

impl Tally {
    const fn merge(self, other: Self) -> Self {
        Self {
            accepted: self.accepted.saturating_add(other.accepted),
            rejected: self.rejected.saturating_add(other.rejected),
        }
    }
}

/// Run `args.workers` threads of `args.rounds` random events each.
///
/// # Errors
///
/// - [`CliError::Core`] if the simulated agents cannot be set up.
/// - [`CliError::Worker`] if a worker thread panics.
pub fn run(economy: &GameEconomy, args: &SimulateArgs) -> Result<SimulationReport, CliError> {
    let seed = args.seed.unwrap_or(economy.config().world.seed);
    let agents = setup_agents(economy, args.agents.max(2))?;
    info!(
        seed,
        agents = agents.len(),
        workers = args.workers,
        rounds = args.rounds,
        "simulation starting"
    );

    let tally = thread::scope(|s| {
        let handles: Vec<_> = (0..args.workers)
            .map(|worker| {
                let agents = &agents;
                let worker_seed = seed.wrapping_add(u64::try_from(worker).unwrap_or(u64::MAX));
                s.spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(worker_seed);
                    drive(economy, agents, args.rounds, &mut rng)
                })
            })
            .collect();

        let mut total = Tally::default();
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(tally) => total = total.merge(tally),
                Err(_) => return Err(CliError::Worker { worker }),
            }
        }
        Ok(total)
    })?;

    let audit = economy.audit()?;
    if let ConservationResult::Anomaly(anomaly) = &audit {
        warn!(?anomaly, "simulation left the ledger unbalanced");
    }
    info!(
        accepted = tally.accepted,
        rejected = tally.rejected,
        "simulation finished"
    );

    Ok(SimulationReport {
        seed,
        agents: agents.len(),
        workers: args.workers,
        accepted: tally.accepted,
        rejected: tally.rejected,
        stats: economy.economy_stats()?,
        audit,
    })
}

/// Open wallets for `sim_0 .. sim_{count-1}` and spread them over the
/// existing factions.
fn setup_agents(economy: &GameEconomy, count: usize) -> Result<Vec<AgentId>, CoreError> {
    let factions = economy.list_factions()?;
    let mut agents = Vec::with_capacity(count);
    for i in 0..count {
        let agent = AgentId::new(format!("sim_{i}"));
        economy.create_wallet(&agent)?;
        if let Some(faction) = factions.get(i.checked_rem(factions.len()).unwrap_or(0)) {
            economy.join_faction(&agent, &faction.name)?;
        }
        agents.push(agent);
    }
    Ok(agents)
}

fn drive(economy: &GameEconomy, agents: &[AgentId], rounds: usize, rng: &mut SmallRng) -> Tally {
    let items: Vec<String> = economy
        .config()
        .market
        .catalog
        .iter()
        .map(|item| item.id.clone())
        .collect();

    let mut tally = Tally::default();
    for _ in 0..rounds {
        let (Some(a), Some(b)) = (agents.choose(rng), agents.choose(rng)) else {
            break;
        };
        let result = match rng.random_range(0..8_u8) {
            0 => {
                let ore = OreType::ALL.choose(rng).copied().unwrap_or(OreType::Coal);
                economy
                    .on_mined(a, ore, rng.random_range(1..=4))
                    .map(drop)
            }
            1 => economy
                .on_crafted(a, "tool", rng.random_range(1..=5))
                .map(drop),
            2 => economy.on_built(a, rng.random_range(1..=20)).map(drop),
            3 => economy
                .trade(a, b, Decimal::new(rng.random_range(1..=40), 0))
                .map(drop),
            4 => economy
                .manual_transfer(a, b, Decimal::new(rng.random_range(1..=25), 0))
                .map(drop),
            5 => match items.choose(rng) {
                Some(item) => economy.contraband_trade(a, b, item, 1).map(drop),
                None => Ok(()),
            },
            6 => economy.on_killed(a, b).map(drop),
            _ => economy
                .issue_bounty(a, b, Decimal::new(rng.random_range(1..=15), 0), "simulated", None)
                .map(drop),
        };
        match result {
            Ok(()) => tally.accepted = tally.accepted.saturating_add(1),
            Err(e) => {
                debug!(agent = %a, error = %e, "simulated event rejected");
                tally.rejected = tally.rejected.saturating_add(1);
            }
        }
    }
    tally
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use clawcraft_core::GameConfig;
    use clawcraft_types::SystemClock;

    use super::*;

    #[test]
    fn small_run_stays_balanced() {
        let economy = GameEconomy::new(GameConfig::default(), Arc::new(SystemClock)).unwrap();
        let args = SimulateArgs {
            agents: 6,
            rounds: 50,
            workers: 3,
            seed: Some(7),
        };
        let report = run(&economy, &args).unwrap();
        assert_eq!(report.accepted.saturating_add(report.rejected), 150);
        assert!(report.accepted > 0);
        assert_eq!(report.audit, ConservationResult::Balanced);
        assert_eq!(report.stats.wallet_count, 6);
    }

    #[test]
    fn agents_are_spread_over_factions() {
        let economy = GameEconomy::new(GameConfig::default(), Arc::new(SystemClock)).unwrap();
        let agents = setup_agents(&economy, 4).unwrap();
        let members: usize = economy
            .list_factions()
            .unwrap()
            .iter()
            .map(|f| f.members.len())
            .sum();
        assert!(members >= agents.len());
    }
}
