//! Realm domain model, rules and Sled-backed persistence.
//!
//! Storage calls are synchronous; async callers go through [`blocking`] so
//! sled I/O never runs on the reactor threads.

pub mod accounts;
pub mod catalog;
pub mod economy;
pub mod errors;
pub mod formulas;
pub mod game_state;
pub mod mapgen;
pub mod quest;
pub mod roster;
pub mod storage;
pub mod types;

pub use accounts::{argon2_from_config, AccountService};
pub use catalog::QuestCatalog;
pub use economy::{end_turn, TurnReport};
pub use errors::RealmError;
pub use formulas::{
    army_cost, army_strength, army_upkeep, attacker_win_probability, building_upgrade_cost,
    combat_resolution, game_stats, resource_production, territory_efficiency, CombatOutcome,
    GameStats, Production,
};
pub use game_state::{assemble_game_state, GameState, Section};
pub use mapgen::{generate_region, GeneratedRegion, MapParams};
pub use quest::{abandon_quest, accept_quest, advance_quest, available_quests, AcceptQuestRequest};
pub use storage::{RealmStore, RealmStoreBuilder};

/// Run storage work on the blocking pool, mapping a panicked or cancelled
/// task to `RealmError::Internal`.
pub async fn blocking<T, F>(work: F) -> Result<T, RealmError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RealmError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RealmError::Internal(format!("storage task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_passes_results_through() {
        assert_eq!(blocking(|| Ok(7)).await.unwrap(), 7);
        let err = blocking(|| -> Result<(), RealmError> { Err(RealmError::NotFound("player: 9".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::NotFound(_)));
    }

    #[tokio::test]
    async fn panicking_work_is_internal() {
        let err = blocking(|| -> Result<(), RealmError> { panic!("sled exploded") })
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::Internal(_)));
    }
}
