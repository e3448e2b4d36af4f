//! Command dispatch: one [`Command`] in, one JSON document out.

use chrono::TimeDelta;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use clawcraft_core::GameEconomy;
use clawcraft_factions::{FactionError, NewFaction};
use clawcraft_types::{BountyId, WarId};

use crate::cli::{
    BountyCommand, Command, ContrabandCommand, EventCommand, FactionCommand, WalletCommand,
    WarCommand,
};
use crate::error::CliError;
use crate::simulate;

/// Result of one command.
#[derive(Debug)]
pub struct Outcome {
    /// Rendered result.
    pub output: Value,
    /// Whether the command changed state that must be flushed.
    pub mutated: bool,
}

impl Outcome {
    fn read<T: Serialize>(value: &T) -> Result<Self, CliError> {
        Ok(Self {
            output: serde_json::to_value(value)?,
            mutated: false,
        })
    }

    fn changed<T: Serialize>(value: &T) -> Result<Self, CliError> {
        Ok(Self {
            output: serde_json::to_value(value)?,
            mutated: true,
        })
    }
}

/// Execute `command` against `economy`.
///
/// # Errors
///
/// Returns [`CliError::Core`] when the economy rejects the command, or
/// [`CliError::Output`] if the result cannot be rendered.
pub fn run(economy: &GameEconomy, command: Command) -> Result<Outcome, CliError> {
    match command {
        Command::Wallet(cmd) => wallet(economy, cmd),
        Command::Transfer { from, to, amount } => {
            Outcome::changed(&economy.manual_transfer(&from, &to, amount)?)
        }
        Command::Trade {
            buyer,
            seller,
            total,
        } => Outcome::changed(&economy.trade(&buyer, &seller, total)?),
        Command::Contraband(cmd) => contraband(economy, cmd),
        Command::Event(cmd) => event(economy, cmd),
        Command::Stats => Outcome::read(&economy.economy_stats()?),
        Command::History { limit } => Outcome::read(&economy.recent_transactions(limit)?),
        Command::Audit => Outcome::read(&economy.audit()?),
        Command::Faction(cmd) => faction(economy, cmd),
        Command::War(cmd) => war(economy, cmd),
        Command::Bounty(cmd) => bounty(economy, cmd),
        Command::Simulate(args) => Outcome::changed(&simulate::run(economy, &args)?),
    }
}

fn wallet(economy: &GameEconomy, cmd: WalletCommand) -> Result<Outcome, CliError> {
    match cmd {
        WalletCommand::Create { agent, balance } => {
            let wallet = match balance {
                Some(balance) => economy.create_wallet_with_balance(&agent, balance)?,
                None => economy.create_wallet(&agent)?,
            };
            info!(%agent, balance = %wallet.balance, "wallet ready");
            Outcome::changed(&wallet)
        }
        WalletCommand::Show { agent } => Outcome::read(&economy.wallet(&agent)?),
        WalletCommand::List => Outcome::read(&economy.list_wallets()?),
    }
}

fn contraband(economy: &GameEconomy, cmd: ContrabandCommand) -> Result<Outcome, CliError> {
    match cmd {
        ContrabandCommand::Prices => Outcome::read(&economy.contraband_prices()?),
        ContrabandCommand::Buy {
            buyer,
            seller,
            item,
            quantity,
        } => Outcome::changed(&economy.contraband_trade(&buyer, &seller, &item, quantity)?),
    }
}

fn event(economy: &GameEconomy, cmd: EventCommand) -> Result<Outcome, CliError> {
    match cmd {
        EventCommand::Mine {
            agent,
            ore,
            quantity,
        } => Outcome::changed(&economy.on_mined(&agent, ore, quantity)?),
        EventCommand::Craft {
            agent,
            item,
            difficulty,
        } => Outcome::changed(&economy.on_crafted(&agent, &item, difficulty)?),
        EventCommand::Build { agent, quantity } => {
            Outcome::changed(&economy.on_built(&agent, quantity)?)
        }
        EventCommand::Kill { killer, victim } => {
            Outcome::changed(&economy.on_killed(&killer, &victim)?)
        }
    }
}

fn faction(economy: &GameEconomy, cmd: FactionCommand) -> Result<Outcome, CliError> {
    match cmd {
        FactionCommand::List => Outcome::read(&economy.list_factions()?),
        FactionCommand::Rankings => Outcome::read(&economy.faction_rankings()?),
        FactionCommand::Create(args) => {
            let founding = NewFaction::new(args.name, args.faction_type, args.leader)
                .with_description(args.description)
                .with_color(args.color)
                .with_motto(args.motto);
            Outcome::changed(&economy.create_faction(founding)?)
        }
        FactionCommand::Join { agent, faction } => {
            Outcome::changed(&economy.join_faction(&agent, &faction)?)
        }
        FactionCommand::Leave { agent } => Outcome::changed(&economy.leave_faction(&agent)?),
        FactionCommand::Claim { faction } => {
            Outcome::changed(&economy.claim_territory(&faction)?)
        }
        FactionCommand::Ally { a, b } => {
            economy.form_alliance(&a, &b)?;
            Outcome::changed(&economy.list_factions()?)
        }
        FactionCommand::Unally { a, b } => {
            economy.break_alliance(&a, &b)?;
            Outcome::changed(&economy.list_factions()?)
        }
        FactionCommand::Events { faction } => match faction {
            Some(name) => Outcome::read(&economy.conflict().registry().events_for(&name)?),
            None => Outcome::read(&economy.faction_events()?),
        },
    }
}

fn war(economy: &GameEconomy, cmd: WarCommand) -> Result<Outcome, CliError> {
    match cmd {
        WarCommand::Declare { a, b, reason } => {
            Outcome::changed(&economy.declare_war(&a, &b, &reason)?)
        }
        WarCommand::Tension { a, b, reason } => {
            Outcome::changed(&economy.raise_tension(&a, &b, &reason)?)
        }
        WarCommand::Armistice { war } => {
            Outcome::changed(&economy.call_armistice(WarId::from(war))?)
        }
        WarCommand::Resume { war } => Outcome::changed(&economy.resume_war(WarId::from(war))?),
        WarCommand::Peace { war } => Outcome::changed(&economy.make_peace(WarId::from(war))?),
        WarCommand::List => Outcome::read(&economy.active_wars()?),
    }
}

fn bounty(economy: &GameEconomy, cmd: BountyCommand) -> Result<Outcome, CliError> {
    match cmd {
        BountyCommand::Issue {
            issuer,
            target,
            amount,
            reason,
            ttl_hours,
        } => {
            let ttl = match ttl_hours {
                Some(hours) => Some(TimeDelta::try_hours(hours).ok_or(FactionError::InvalidDuration)?),
                None => None,
            };
            Outcome::changed(&economy.issue_bounty(&issuer, &target, amount, &reason, ttl)?)
        }
        BountyCommand::Claim { bounty, claimer } => {
            Outcome::changed(&economy.claim_bounty(BountyId::from(bounty), &claimer)?)
        }
        BountyCommand::List { target } => match target {
            Some(agent) => Outcome::read(&economy.conflict().bounties_on(&agent)?),
            None => Outcome::read(&economy.active_bounties()?),
        },
        BountyCommand::Sweep => Outcome::changed(&economy.sweep_expired_bounties()?),
    }
}
