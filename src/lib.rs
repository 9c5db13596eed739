//! # Kingsreach - server for a persistent medieval strategy realm
//!
//! Kingsreach keeps a shared, procedurally generated world in an embedded
//! store and exposes it to browser clients over JSON/HTTP. Players register,
//! raise armies, hold territories, hire companions, run crusades and quest
//! chains, and settle their treasury one turn at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kingsreach::api::{serve, AppState};
//! use kingsreach::config::Config;
//! use kingsreach::realm::{QuestCatalog, RealmStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = RealmStore::open(config.storage.realm_path())?;
//!     let catalog = QuestCatalog::builtin()?;
//!     let state = Arc::new(AppState::new(store, catalog, config));
//!     serve(state, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`realm`] - game records, the sled-backed store, formulas, map generation,
//!   quests, the turn economy and the aggregated game state
//! - [`api`] - axum router, handlers and the HTTP error mapping
//! - [`config`] - TOML configuration with defaults for every section
//! - [`validation`] - player name, password and free text checks
//! - [`metrics`] - in-process request and economy counters
//! - [`logutil`] - helpers for writing untrusted text to logs

pub mod api;
pub mod config;
pub mod logutil;
pub mod metrics;
pub mod realm;
pub mod validation;
