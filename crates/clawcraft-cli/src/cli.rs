//! Command-line grammar.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use clawcraft_types::{AgentId, FactionName, FactionType, OreType};

/// ClawCraft economy and faction operator tool.
///
/// State is loaded from `PostgreSQL` when `infrastructure.postgres_url` (or
/// `DATABASE_URL`) is set, otherwise from `--state` when given, and flushed
/// back after every command that changes it.
#[derive(Parser, Debug)]
#[command(name = "clawcraft", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "clawcraft-config.yaml")]
    pub config: PathBuf,

    /// JSON snapshot file used when no database is configured.
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wallet management.
    #[command(subcommand)]
    Wallet(WalletCommand),

    /// Move coins between agents.
    Transfer {
        /// Paying agent (`system` to mint).
        from: AgentId,
        /// Receiving agent (`system` to burn).
        to: AgentId,
        /// Amount in coins.
        amount: Decimal,
    },

    /// Settle a legal trade, charging the market fee to the buyer.
    Trade {
        /// Paying agent.
        buyer: AgentId,
        /// Receiving agent.
        seller: AgentId,
        /// Total price.
        total: Decimal,
    },

    /// Black market quotes and deals.
    #[command(subcommand)]
    Contraband(ContrabandCommand),

    /// Report a game event.
    #[command(subcommand)]
    Event(EventCommand),

    /// Supply, volume and leaderboard.
    Stats,

    /// Recent ledger transactions, newest first.
    History {
        /// Number of transactions to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run the conservation audit.
    Audit,

    /// Faction management.
    #[command(subcommand)]
    Faction(FactionCommand),

    /// War management.
    #[command(subcommand)]
    War(WarCommand),

    /// Bounty management.
    #[command(subcommand)]
    Bounty(BountyCommand),

    /// Drive random concurrent activity and audit the result.
    Simulate(SimulateArgs),
}

/// `wallet` subcommands.
#[derive(Subcommand, Debug)]
pub enum WalletCommand {
    /// Open a wallet; existing wallets are returned unchanged.
    Create {
        /// Owner.
        agent: AgentId,
        /// Starting balance; defaults to `world.starting_balance`.
        #[arg(long)]
        balance: Option<Decimal>,
    },
    /// Show one wallet.
    Show {
        /// Owner.
        agent: AgentId,
    },
    /// List all wallets.
    List,
}

/// `contraband` subcommands.
#[derive(Subcommand, Debug)]
pub enum ContrabandCommand {
    /// Current quotes for every catalog item.
    Prices,
    /// Attempt a deal.
    Buy {
        /// Paying agent.
        buyer: AgentId,
        /// Dealer.
        seller: AgentId,
        /// Catalog id.
        item: String,
        /// Units to buy.
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
}

/// `event` subcommands.
#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Ore mined.
    Mine {
        /// Miner.
        agent: AgentId,
        /// Ore name (coal, iron, gold, diamond, emerald, netherite, other).
        ore: OreType,
        /// Units mined.
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
    /// Item crafted.
    Craft {
        /// Crafter.
        agent: AgentId,
        /// Item name.
        item: String,
        /// Recipe difficulty.
        #[arg(default_value_t = 1)]
        difficulty: u32,
    },
    /// Blocks placed.
    Build {
        /// Builder.
        agent: AgentId,
        /// Blocks placed.
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
    /// PvP kill.
    Kill {
        /// Killer.
        killer: AgentId,
        /// Victim.
        victim: AgentId,
    },
}

/// `faction` subcommands.
#[derive(Subcommand, Debug)]
pub enum FactionCommand {
    /// List all factions.
    List,
    /// Power leaderboard.
    Rankings,
    /// Found a faction.
    Create(CreateFactionArgs),
    /// Join a faction, leaving any current one.
    Join {
        /// Joining agent.
        agent: AgentId,
        /// Faction name.
        faction: FactionName,
    },
    /// Leave the current faction.
    Leave {
        /// Leaving agent.
        agent: AgentId,
    },
    /// Claim an outpost territory.
    Claim {
        /// Faction name.
        faction: FactionName,
    },
    /// Ally two factions.
    Ally {
        /// First faction.
        a: FactionName,
        /// Second faction.
        b: FactionName,
    },
    /// Dissolve an alliance.
    Unally {
        /// First faction.
        a: FactionName,
        /// Second faction.
        b: FactionName,
    },
    /// The faction audit log.
    Events {
        /// Restrict to one faction.
        #[arg(long)]
        faction: Option<FactionName>,
    },
}

/// Arguments of `faction create`.
#[derive(Args, Debug)]
pub struct CreateFactionArgs {
    /// Unique name.
    pub name: FactionName,
    /// Type (builders, miners, warriors, traders, outlaws).
    pub faction_type: FactionType,
    /// Founding leader.
    pub leader: AgentId,
    /// Description.
    #[arg(long, default_value = "")]
    pub description: String,
    /// Display colour.
    #[arg(long, default_value = "#808080")]
    pub color: String,
    /// Motto.
    #[arg(long, default_value = "")]
    pub motto: String,
}

/// `war` subcommands.
#[derive(Subcommand, Debug)]
pub enum WarCommand {
    /// Declare war, escalating any open tension.
    Declare {
        /// Declaring faction.
        a: FactionName,
        /// Target faction.
        b: FactionName,
        /// Stated reason.
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Record rising tension without fighting.
    Tension {
        /// First faction.
        a: FactionName,
        /// Second faction.
        b: FactionName,
        /// Stated reason.
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Pause a war.
    Armistice {
        /// War id.
        war: Uuid,
    },
    /// Resume a paused war.
    Resume {
        /// War id.
        war: Uuid,
    },
    /// End a conflict without settlement.
    Peace {
        /// War id.
        war: Uuid,
    },
    /// Active conflicts.
    List,
}

/// `bounty` subcommands.
#[derive(Subcommand, Debug)]
pub enum BountyCommand {
    /// Post a bounty; agent issuers fund it from their balance.
    Issue {
        /// Paying agent (`system` for an operator bounty).
        issuer: AgentId,
        /// Target agent.
        target: AgentId,
        /// Reward.
        amount: Decimal,
        /// Reason text.
        #[arg(long, default_value = "")]
        reason: String,
        /// Lifetime in hours; defaults to `conflict.bounty_ttl_hours`.
        #[arg(long)]
        ttl_hours: Option<i64>,
    },
    /// Claim a bounty directly.
    Claim {
        /// Bounty id.
        bounty: Uuid,
        /// Claimant.
        claimer: AgentId,
    },
    /// Open bounties.
    List {
        /// Restrict to one target.
        #[arg(long)]
        target: Option<AgentId>,
    },
    /// Expire overdue bounties and refund their escrow.
    Sweep,
}

/// Arguments of `simulate`.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of simulated agents.
    #[arg(long, default_value_t = 20)]
    pub agents: usize,
    /// Events per worker.
    #[arg(long, default_value_t = 200)]
    pub rounds: usize,
    /// Concurrent workers.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,
    /// Random seed; defaults to `world.seed`.
    #[arg(long)]
    pub seed: Option<u64>,
}
