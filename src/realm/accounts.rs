//! Player registration and login.
//!
//! Passwords are hashed with Argon2id into PHC strings kept in the store's
//! credential tree. Hashing and verification run on the blocking pool since a
//! single call can take tens of milliseconds with production parameters.

use argon2::{Algorithm, Argon2, Params, Version};
use log::{info, warn};
use password_hash::{PasswordHasher, PasswordVerifier};
use rand::thread_rng;

use crate::config::{Argon2Config, Config, EconomyConfig, NewPlayerConfig};
use crate::logutil::escape_log;
use crate::realm::blocking;
use crate::realm::errors::RealmError;
use crate::realm::mapgen::MapParams;
use crate::realm::roster::starting_holdings;
use crate::realm::storage::RealmStore;
use crate::realm::types::{Coord, PlayerRecord};
use crate::validation::{validate_password, validate_player_name};

const BAD_CREDENTIALS: &str = "invalid username or password";

/// Build the hasher from optional config; unset fields keep argon2's defaults.
pub fn argon2_from_config(cfg: Option<&Argon2Config>) -> Argon2<'static> {
    let Some(a) = cfg else {
        return Argon2::default();
    };
    let builder = Params::DEFAULT;
    let mem = a.memory_kib.unwrap_or(builder.m_cost());
    let time = a.time_cost.unwrap_or(builder.t_cost());
    let para = a.parallelism.unwrap_or(builder.p_cost());
    match Params::new(mem, time, para, None) {
        Ok(params) => Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        Err(e) => {
            warn!("Ignoring invalid argon2 parameters ({}); using defaults", e);
            Argon2::default()
        }
    }
}

/// Everything registration needs besides the request itself.
#[derive(Clone)]
pub struct AccountService {
    store: RealmStore,
    argon2: Argon2<'static>,
    new_player: NewPlayerConfig,
    economy: EconomyConfig,
    map: MapParams,
}

impl AccountService {
    pub fn new(store: RealmStore, config: &Config) -> Self {
        Self::with_hasher(
            store,
            argon2_from_config(config.security.argon2.as_ref()),
            config,
        )
    }

    pub fn with_hasher(store: RealmStore, argon2: Argon2<'static>, config: &Config) -> Self {
        Self {
            store,
            argon2,
            new_player: config.new_player.clone(),
            economy: config.economy.clone(),
            map: MapParams::from(&config.world),
        }
    }

    /// Create a player with the configured starting resources, its capital,
    /// first companion, guard army and welcome event, and generate the map
    /// around the spawn point.
    pub async fn register(&self, username: &str, password: &str) -> Result<PlayerRecord, RealmError> {
        let username = validate_player_name(username)
            .map_err(|e| RealmError::InvalidInput(e.to_string()))?;
        validate_password(password).map_err(|e| RealmError::InvalidInput(e.to_string()))?;

        // Fail fast before paying for a hash; create_player re-checks atomically.
        let lookup_store = self.store.clone();
        let lookup_name = username.clone();
        if blocking(move || lookup_store.find_player_by_username(&lookup_name))
            .await?
            .is_some()
        {
            warn!(target: "security", "Registration rejected, username taken: {}", escape_log(&username));
            return Err(RealmError::Conflict(format!("username already taken: {}", username)));
        }

        let hasher = self.argon2.clone();
        let secret = password.to_string();
        let hash = blocking(move || {
            let salt = password_hash::SaltString::generate(&mut thread_rng());
            hasher
                .hash_password(secret.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| RealmError::Internal(format!("password hash failure: {}", e)))
        })
        .await?;

        let service = self.clone();
        let player = blocking(move || service.create_with_holdings(&username, &hash)).await;
        match &player {
            Ok(p) => info!("Registered player {} (id {})", escape_log(&p.username), p.id),
            Err(RealmError::Conflict(_)) => {
                warn!(target: "security", "Registration lost a race for a username");
            }
            Err(_) => {}
        }
        player
    }

    fn create_with_holdings(&self, username: &str, hash: &str) -> Result<PlayerRecord, RealmError> {
        let cfg = &self.new_player;
        let mut player = PlayerRecord::new(0, username);
        player.gold = cfg.gold;
        player.food = cfg.food;
        player.materials = cfg.materials;
        player.population = cfg.population;
        player.health = cfg.health;
        player.max_health = cfg.health;
        player.honor = cfg.honor;
        player.position_x = cfg.spawn_x;
        player.position_y = cfg.spawn_y;
        for faction in self.store.list_factions()? {
            player.faction_reputations.insert(faction.name, 0);
        }

        let player = self.store.create_player(player, hash)?;

        let holdings = starting_holdings(player.id, cfg, &self.economy);
        self.store.insert_territory(holdings.capital)?;
        self.store.insert_companion(holdings.companion)?;
        self.store.insert_army(holdings.guard)?;
        self.store.append_event(holdings.welcome)?;

        let spawn = Coord::new(cfg.spawn_x, cfg.spawn_y);
        self.store.ensure_region(spawn, &self.map, &mut thread_rng())?;
        Ok(player)
    }

    /// Check credentials. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<PlayerRecord, RealmError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(RealmError::InvalidInput(
                "username and password are required".into(),
            ));
        }
        let store = self.store.clone();
        let name = username.trim().to_string();
        let found = blocking(move || {
            let Some(player) = store.find_player_by_username(&name)? else {
                return Ok(None);
            };
            let stored = store.get_credential(player.id)?;
            Ok(Some((player, stored)))
        })
        .await?;

        let Some((player, stored)) = found else {
            warn!(target: "security", "Login failed for unknown user {}", escape_log(username));
            return Err(RealmError::Unauthorized(BAD_CREDENTIALS.into()));
        };

        let hasher = self.argon2.clone();
        let secret = password.to_string();
        let ok = blocking(move || {
            let parsed = password_hash::PasswordHash::new(&stored)
                .map_err(|e| RealmError::Internal(format!("corrupt password hash: {}", e)))?;
            Ok(hasher.verify_password(secret.as_bytes(), &parsed).is_ok())
        })
        .await?;

        if !ok {
            warn!(target: "security", "Login failed for {}: bad password", escape_log(&player.username));
            return Err(RealmError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        info!("Player {} logged in", escape_log(&player.username));
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::storage::RealmStoreBuilder;
    use tempfile::TempDir;

    fn cheap_service(dir: &TempDir) -> AccountService {
        let store = RealmStoreBuilder::new(dir.path()).open().expect("store");
        let params = Params::new(8, 1, 1, None).expect("params");
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        AccountService::with_hasher(store, argon2, &Config::default())
    }

    #[tokio::test]
    async fn register_then_login() {
        let dir = TempDir::new().unwrap();
        let accounts = cheap_service(&dir);
        let player = accounts.register("alice", "correct horse").await.expect("register");
        assert_eq!(player.gold, 5000);
        assert_eq!(player.faction_reputations.len(), 3);

        let again = accounts.login("ALICE", "correct horse").await.expect("login");
        assert_eq!(again.id, player.id);

        let err = accounts.login("alice", "wrong password").await.unwrap_err();
        assert!(matches!(err, RealmError::Unauthorized(_)));
        let err = accounts.login("nobody", "whatever1").await.unwrap_err();
        assert!(matches!(err, RealmError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn registration_seeds_starting_holdings() {
        let dir = TempDir::new().unwrap();
        let accounts = cheap_service(&dir);
        let player = accounts.register("bertram", "hunter2hunter2").await.expect("register");
        let store = &accounts.store;
        assert_eq!(store.territories_for_player(player.id).unwrap().len(), 1);
        assert_eq!(store.companions_for_player(player.id).unwrap()[0].name, "Sir Gareth");
        let guard = &store.armies_for_player(player.id).unwrap()[0];
        assert_eq!(guard.total_strength, 1090);
        assert_eq!(store.recent_events(player.id, 5).unwrap()[0].kind, "welcome");
        assert_eq!(store.count_tiles(), 121);
    }

    #[tokio::test]
    async fn registration_rejects_bad_input_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let accounts = cheap_service(&dir);
        assert!(matches!(
            accounts.register("al", "longenough").await,
            Err(RealmError::InvalidInput(_))
        ));
        assert!(matches!(
            accounts.register("alfred", "short").await,
            Err(RealmError::InvalidInput(_))
        ));
        accounts.register("alfred", "longenough").await.expect("first");
        assert!(matches!(
            accounts.register("Alfred", "longenough").await,
            Err(RealmError::Conflict(_))
        ));
        assert!(matches!(
            accounts.login("", "").await,
            Err(RealmError::InvalidInput(_))
        ));
    }
}
