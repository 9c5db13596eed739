//! # Configuration Management Module
//!
//! Kingsreach reads a single TOML file at startup. Every section carries serde
//! defaults, so a partial file (or an empty one) is a valid configuration.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - HTTP listener (name, bind address, port)
//! - [`StorageConfig`] - Where the sled realm database lives
//! - [`LoggingConfig`] - Log level, optional log file and security log
//! - [`SecurityConfig`] - Argon2 cost parameters for password hashing
//! - [`EconomyConfig`] - Unit cost/strength/upkeep tables and building costs
//! - [`NewPlayerConfig`] - Starting resources and spawn point
//! - [`WorldConfig`] - Map radii, quest-giver faction and roster limits
//! - [`QuestConfig`] - Optional external quest catalog
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kingsreach::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}:{}", config.server.bind_address, config.server.port);
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! name = "Kingsreach"
//! bind_address = "0.0.0.0"
//! port = 5000
//!
//! [economy.unit_strength]
//! heavy_infantry = 10
//! archers = 8
//! cavalry = 15
//! siege_engines = 25
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub new_player: NewPlayerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub quests: QuestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Kingsreach".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional override for the sled database path; defaults to `<data_dir>/realm`.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            db_path: None,
        }
    }
}

impl StorageConfig {
    pub fn realm_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("realm"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("kingsreach.log".to_string()),
            security_file: Some("kingsreach-security.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

/// Per-unit weights for the four troop kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitTable {
    pub heavy_infantry: i64,
    pub archers: i64,
    pub cavalry: i64,
    pub siege_engines: i64,
}

impl UnitTable {
    pub const fn new(heavy_infantry: i64, archers: i64, cavalry: i64, siege_engines: i64) -> Self {
        Self {
            heavy_infantry,
            archers,
            cavalry,
            siege_engines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_unit_costs")]
    pub unit_costs: UnitTable,
    #[serde(default = "default_unit_strength")]
    pub unit_strength: UnitTable,
    #[serde(default = "default_unit_upkeep")]
    pub unit_upkeep: UnitTable,
    #[serde(default = "default_building_upgrade_base_cost")]
    pub building_upgrade_base_cost: i64,
}

fn default_unit_costs() -> UnitTable {
    UnitTable::new(45, 35, 85, 200)
}

fn default_unit_strength() -> UnitTable {
    UnitTable::new(10, 8, 15, 25)
}

fn default_unit_upkeep() -> UnitTable {
    UnitTable::new(2, 1, 3, 5)
}

fn default_building_upgrade_base_cost() -> i64 {
    500
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            unit_costs: default_unit_costs(),
            unit_strength: default_unit_strength(),
            unit_upkeep: default_unit_upkeep(),
            building_upgrade_base_cost: default_building_upgrade_base_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPlayerConfig {
    pub gold: i64,
    pub food: i64,
    pub materials: i64,
    pub population: i64,
    pub health: i64,
    pub honor: i64,
    pub spawn_x: i32,
    pub spawn_y: i32,
}

impl Default for NewPlayerConfig {
    fn default() -> Self {
        Self {
            gold: 5000,
            food: 2000,
            materials: 1000,
            population: 10000,
            health: 100,
            honor: 100,
            spawn_x: 5,
            spawn_y: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Half-width of the generated/visible square around a player (5 gives 11×11).
    pub view_radius: u32,
    /// Manhattan radius marked explored around an origin.
    pub explore_radius: u32,
    /// Chebyshev radius used to list armies near a player.
    pub nearby_army_radius: u32,
    pub quest_giver_faction: String,
    pub recent_events_limit: usize,
    pub max_companions: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_radius: 5,
            explore_radius: 2,
            nearby_army_radius: 3,
            quest_giver_faction: "Kingdom of Valor".to_string(),
            recent_events_limit: 10,
            max_companions: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuestConfig {
    /// JSON file replacing the built-in quest catalog.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}
