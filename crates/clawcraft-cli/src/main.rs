//! Operator binary for the ClawCraft economy and faction core.
//!
//! Every invocation runs one command against the game state and prints the
//! result as JSON on stdout. Logs go to stderr.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load configuration from the YAML file (defaults when it is missing)
//! 3. Initialize structured logging (tracing)
//! 4. Load state from `PostgreSQL`, the state file, or start fresh
//! 5. Run the command
//! 6. Flush state back if the command changed it
//! 7. Print the result

mod cli;
mod commands;
mod error;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clawcraft_core::{GameConfig, GameEconomy, GameSnapshot};
use clawcraft_db::{GameStore, PostgresConfig, PostgresPool};
use clawcraft_types::{Clock, SystemClock};

use crate::cli::Cli;
use crate::error::CliError;

/// Where game state is loaded from and flushed to.
enum StateBackend {
    /// A `PostgreSQL` database.
    Postgres(PostgresPool),
    /// A local JSON snapshot file.
    File(PathBuf),
    /// Nothing; state lives for one command only.
    Ephemeral,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, state loading, the command itself or
/// the final flush fails.
#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    init_tracing(&config);
    info!(world_name = config.world.name, seed = config.world.seed, "configuration loaded");

    let backend = open_backend(&config, cli.state).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let economy = match load_snapshot(&backend).await? {
        Some(snapshot) => GameEconomy::restore(config, clock, snapshot)?,
        None => {
            info!("no saved state, starting a fresh world");
            GameEconomy::new(config, clock)?
        }
    };

    let outcome = commands::run(&economy, cli.command)?;
    if outcome.mutated {
        flush(&backend, &economy.snapshot()?).await?;
    }
    if let StateBackend::Postgres(pool) = &backend {
        pool.close().await;
    }

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(())
}

fn init_tracing(config: &GameConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
fn load_config(path: &Path) -> Result<GameConfig, CliError> {
    if path.exists() {
        Ok(GameConfig::from_file(path)?)
    } else {
        let mut config = GameConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

async fn open_backend(config: &GameConfig, state: Option<PathBuf>) -> Result<StateBackend, CliError> {
    if let Some(url) = &config.infrastructure.postgres_url {
        let pg = PostgresConfig::new(url).with_max_connections(config.infrastructure.max_connections);
        let pool = PostgresPool::connect(&pg).await?;
        pool.run_migrations().await?;
        info!("connected to PostgreSQL");
        if state.is_some() {
            warn!("--state is ignored while a database is configured");
        }
        return Ok(StateBackend::Postgres(pool));
    }
    Ok(state.map_or(StateBackend::Ephemeral, StateBackend::File))
}

async fn load_snapshot(backend: &StateBackend) -> Result<Option<GameSnapshot>, CliError> {
    match backend {
        StateBackend::Postgres(pool) => Ok(GameStore::new(pool.pool()).load().await?),
        StateBackend::File(path) => {
            if !path.exists() {
                return Ok(None);
            }
            let contents = std::fs::read_to_string(path).map_err(|e| state_error(path, &e))?;
            let snapshot = serde_json::from_str(&contents).map_err(|e| state_error(path, &e))?;
            Ok(Some(snapshot))
        }
        StateBackend::Ephemeral => Ok(None),
    }
}

async fn flush(backend: &StateBackend, snapshot: &GameSnapshot) -> Result<(), CliError> {
    match backend {
        StateBackend::Postgres(pool) => GameStore::new(pool.pool()).save(snapshot).await?,
        StateBackend::File(path) => {
            let contents = serde_json::to_string_pretty(snapshot)?;
            std::fs::write(path, contents).map_err(|e| state_error(path, &e))?;
        }
        StateBackend::Ephemeral => {
            warn!("no database or --state file configured; changes were not saved");
            return Ok(());
        }
    }
    info!(
        block_height = snapshot.economy.block_height,
        "state flushed"
    );
    Ok(())
}

fn state_error(path: &Path, error: &dyn std::fmt::Display) -> CliError {
    CliError::StateFile {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}
