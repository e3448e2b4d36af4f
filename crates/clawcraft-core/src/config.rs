//! Configuration loading and typed config structures for ClawCraft.
//!
//! The canonical configuration lives in `clawcraft-config.yaml` at the
//! project root. Every section and field is optional; missing values fall
//! back to the defaults below.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use clawcraft_factions::{ConflictSettings, FactionSettings};
use clawcraft_ledger::contraband::default_catalog;
use clawcraft_ledger::{MarketSettings, RewardSchedule};
use clawcraft_types::ContrabandItem;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level game configuration, mirroring `clawcraft-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GameConfig {
    /// World-level settings.
    #[serde(default)]
    pub world: WorldConfig,

    /// Reward and fee schedule.
    #[serde(default)]
    pub economy: RewardSchedule,

    /// Contraband pricing and catalog.
    #[serde(default)]
    pub market: MarketConfig,

    /// Starting values for factions and territory placement.
    #[serde(default)]
    pub factions: FactionSettings,

    /// War scoring and bounty settings.
    #[serde(default)]
    pub conflict: ConflictSettings,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GameConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `DATABASE_URL` overrides `infrastructure.postgres_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable server name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for market rolls and territory placement.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Coins granted to every newly created wallet.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,

    /// Create the default factions when the registry is empty.
    #[serde(default = "default_true")]
    pub seed_factions: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            starting_balance: default_starting_balance(),
            seed_factions: true,
        }
    }
}

/// Contraband market configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketConfig {
    /// Pricing and risk parameters.
    #[serde(flatten)]
    pub settings: MarketSettings,

    /// Tradable items.
    #[serde(default = "default_catalog")]
    pub catalog: Vec<ContrabandItem>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            settings: MarketSettings::default(),
            catalog: default_catalog(),
        }
    }
}

/// Infrastructure configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string. State is kept in memory only when unset.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl InfrastructureConfig {
    /// Override the database URL with `DATABASE_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.postgres_url = Some(val);
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "ClawCraft".to_owned()
}

const fn default_seed() -> u64 {
    42
}

fn default_starting_balance() -> Decimal {
    Decimal::new(100, 0)
}

const fn default_true() -> bool {
    true
}

const fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GameConfig::default();
        assert_eq!(config.world.seed, 42);
        assert_eq!(config.world.starting_balance, Decimal::new(100, 0));
        assert_eq!(config.market.catalog.len(), 5);
        assert_eq!(config.conflict.victory_threshold, 10);
        assert_eq!(config.factions.starting_treasury, Decimal::new(500, 0));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
world:
  name: "Test Server"
  seed: 7
  starting_balance: 250
  seed_factions: false

economy:
  mining_base: 6
  pvp_kill_reward: 30

market:
  risk_cap: 0.5
  catalog:
    - id: moon_dust
      name: Moon Dust
      base_value: 10
      rarity: 0.5
      risk_multiplier: 1
      legal_status: contraband
      description: glows faintly

factions:
  starting_treasury: 1000
  claim_attempts: 8

conflict:
  victory_threshold: 3
  bounty_ttl_hours: 6

infrastructure:
  postgres_url: "postgres://clawcraft@localhost/clawcraft"
  max_connections: 2

logging:
  level: debug
  json: true
"#;
        let config = GameConfig::parse(yaml).unwrap();
        assert_eq!(config.world.name, "Test Server");
        assert_eq!(config.world.starting_balance, Decimal::new(250, 0));
        assert!(!config.world.seed_factions);
        assert_eq!(config.economy.mining_base, Decimal::new(6, 0));
        assert_eq!(config.economy.crafting_base, Decimal::new(3, 0));
        assert_eq!(config.market.settings.risk_cap, Decimal::new(5, 1));
        assert_eq!(config.market.catalog.len(), 1);
        assert_eq!(config.factions.starting_treasury, Decimal::new(1000, 0));
        assert_eq!(config.factions.territory_radius, 50);
        assert_eq!(config.conflict.victory_threshold, 3);
        assert_eq!(config.infrastructure.max_connections, 2);
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = GameConfig::parse("world:\n  seed: 9\n").unwrap();
        assert_eq!(config.world.seed, 9);
        assert_eq!(config.world.starting_balance, Decimal::new(100, 0));
        assert_eq!(config.economy, RewardSchedule::default());
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(GameConfig::parse("").is_ok());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            GameConfig::parse("world: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("clawcraft-config.yaml");
        if path.exists() {
            let config = GameConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
            let config = config.unwrap();
            let defaults = GameConfig::default();
            assert_eq!(config.world, defaults.world);
            assert_eq!(config.economy, defaults.economy);
            assert_eq!(config.market, defaults.market);
            assert_eq!(config.factions, defaults.factions);
            assert_eq!(config.conflict, defaults.conflict);
        }
    }
}
