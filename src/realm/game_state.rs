//! The per-request aggregate a client renders its whole view from.
//!
//! Every field is fetched independently on the blocking pool and the fetches
//! run concurrently. A failing fetch degrades only its own field to
//! [`Section::Unavailable`]; the request as a whole fails only when the player
//! does not exist. No transaction spans the fetches, so fields may reflect
//! slightly different instants.

use chrono::Utc;
use log::warn;
use rand::thread_rng;
use serde::Serialize;
use std::sync::Arc;

use crate::config::WorldConfig;
use crate::realm::blocking;
use crate::realm::catalog::QuestCatalog;
use crate::realm::errors::RealmError;
use crate::realm::formulas::{game_stats, GameStats};
use crate::realm::mapgen::MapParams;
use crate::realm::quest::available_quests;
use crate::realm::storage::RealmStore;
use crate::realm::types::{
    ArmyRecord, CombatEncounterRecord, CompanionRecord, CrusadeRecord, FactionRecord,
    GameEventRecord, InventoryItem, MapTileRecord, PlayerQuestRecord, PlayerRecord,
    QuestDefinition, TerritoryRecord, WorldEventRecord,
};

/// Outcome of one sub-fetch. An empty collection is `Ok` with empty data,
/// which clients can tell apart from a fetch that failed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ok { data: T },
    Unavailable { error: String },
}

impl<T> Section<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Section::Ok { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Ok { data } => Some(data),
            Section::Unavailable { .. } => None,
        }
    }

    fn from_result(field: &'static str, player_id: u64, result: Result<T, RealmError>) -> Self {
        match result {
            Ok(data) => Section::Ok { data },
            Err(e) => {
                warn!("game-state {} unavailable for player {}: {}", field, player_id, e);
                Section::Unavailable {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub player: PlayerRecord,
    pub companions: Section<Vec<CompanionRecord>>,
    pub territories: Section<Vec<TerritoryRecord>>,
    pub armies: Section<Vec<ArmyRecord>>,
    pub crusades: Section<Vec<CrusadeRecord>>,
    pub active_quests: Section<Vec<PlayerQuestRecord>>,
    pub available_quests: Section<Vec<QuestDefinition>>,
    pub recent_events: Section<Vec<GameEventRecord>>,
    pub inventory: Section<Vec<InventoryItem>>,
    pub factions: Section<Vec<FactionRecord>>,
    pub world_events: Section<Vec<WorldEventRecord>>,
    pub nearby_tiles: Section<Vec<MapTileRecord>>,
    pub nearby_armies: Section<Vec<ArmyRecord>>,
    pub active_combat: Section<Option<CombatEncounterRecord>>,
    pub stats: Section<GameStats>,
}

async fn fetch<T, F>(field: &'static str, player_id: u64, store: &RealmStore, f: F) -> Section<T>
where
    T: Send + 'static,
    F: FnOnce(RealmStore) -> Result<T, RealmError> + Send + 'static,
{
    let store = store.clone();
    Section::from_result(field, player_id, blocking(move || f(store)).await)
}

/// Build the aggregate for `player_id`. Returns `NotFound` only when the
/// player itself is missing.
pub async fn assemble_game_state(
    store: &RealmStore,
    catalog: Arc<QuestCatalog>,
    world: &WorldConfig,
    player_id: u64,
) -> Result<GameState, RealmError> {
    let lookup = store.clone();
    let player = blocking(move || lookup.get_player(player_id)).await?;
    let position = player.position();
    let map = MapParams::from(world);
    let nearby_radius = world.nearby_army_radius;
    let events_limit = world.recent_events_limit;
    let quest_player = player.clone();

    let (
        companions,
        territories,
        armies,
        crusades,
        quests,
        recent_events,
        inventory,
        factions,
        world_events,
        nearby_tiles,
        nearby_armies,
        active_combat,
    ) = tokio::join!(
        fetch("companions", player_id, store, move |s| s.companions_for_player(player_id)),
        fetch("territories", player_id, store, move |s| s.territories_for_player(player_id)),
        fetch("armies", player_id, store, move |s| s.armies_for_player(player_id)),
        fetch("crusades", player_id, store, move |s| s.crusades_for_player(player_id)),
        fetch("quests", player_id, store, move |s| {
            let records = s.player_quests_for(player_id)?;
            let available = available_quests(&catalog, &quest_player, &records);
            let active: Vec<PlayerQuestRecord> =
                records.into_iter().filter(|r| r.is_active()).collect();
            Ok((active, available))
        }),
        fetch("recentEvents", player_id, store, move |s| s.recent_events(player_id, events_limit)),
        fetch("inventory", player_id, store, move |s| s.inventory_for(player_id)),
        fetch("factions", player_id, store, |s| s.list_factions()),
        fetch("worldEvents", player_id, store, |s| s.active_world_events(Utc::now())),
        fetch("nearbyTiles", player_id, store, move |s| {
            s.ensure_region(position, &map, &mut thread_rng())?;
            s.tiles_around(position, map.radius)
        }),
        fetch("nearbyArmies", player_id, store, move |s| s.armies_near(position, nearby_radius)),
        fetch("activeCombat", player_id, store, move |s| s.active_combat(player_id)),
    );

    let (active_quests, available_quests) = match quests {
        Section::Ok { data: (active, available) } => (
            Section::Ok { data: active },
            Section::Ok { data: available },
        ),
        Section::Unavailable { error } => (
            Section::Unavailable {
                error: error.clone(),
            },
            Section::Unavailable { error },
        ),
    };

    let stats = match (territories.data(), armies.data(), crusades.data()) {
        (Some(t), Some(a), Some(c)) => Section::Ok {
            data: game_stats(t, a, c),
        },
        _ => Section::Unavailable {
            error: "depends on an unavailable section".to_string(),
        },
    };

    Ok(GameState {
        player,
        companions,
        territories,
        armies,
        crusades,
        active_quests,
        available_quests,
        recent_events,
        inventory,
        factions,
        world_events,
        nearby_tiles,
        nearby_armies,
        active_combat,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::storage::RealmStoreBuilder;
    use tempfile::TempDir;

    fn store_with_player(dir: &TempDir) -> (RealmStore, u64) {
        let store = RealmStoreBuilder::new(dir.path()).open().expect("store");
        let player = store
            .create_player(PlayerRecord::new(0, "hermit"), "h")
            .expect("create");
        (store, player.id)
    }

    fn catalog() -> Arc<QuestCatalog> {
        Arc::new(QuestCatalog::builtin().expect("builtin quests"))
    }

    #[test]
    fn sections_serialize_with_status_tag() {
        let ok: Section<Vec<u32>> = Section::Ok { data: vec![] };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["data"].as_array().unwrap().is_empty());

        let down: Section<Vec<u32>> = Section::Unavailable {
            error: "sled error".into(),
        };
        let json = serde_json::to_value(&down).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["error"], "sled error");
        assert!(down.data().is_none());
    }

    #[test]
    fn absent_combat_is_ok_null() {
        let none: Section<Option<u32>> = Section::Ok { data: None };
        let json = serde_json::to_value(&none).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn player_without_holdings_gets_empty_sections() {
        let dir = TempDir::new().expect("tempdir");
        let (store, id) = store_with_player(&dir);
        let state = assemble_game_state(&store, catalog(), &WorldConfig::default(), id)
            .await
            .expect("game state");

        assert_eq!(state.companions.data().map(Vec::len), Some(0));
        assert_eq!(state.territories.data().map(Vec::len), Some(0));
        assert_eq!(state.armies.data().map(Vec::len), Some(0));
        assert_eq!(state.crusades.data().map(Vec::len), Some(0));
        assert_eq!(state.active_quests.data().map(Vec::len), Some(0));
        assert_eq!(state.inventory.data().map(Vec::len), Some(0));
        assert_eq!(state.nearby_armies.data().map(Vec::len), Some(0));
        assert_eq!(state.active_combat, Section::Ok { data: None });
        assert_eq!(state.nearby_tiles.data().map(Vec::len), Some(121));
        let stats = state.stats.data().expect("stats");
        assert_eq!(stats.total_territories, 0);
        assert_eq!(stats.total_army_strength, 0);
        assert_eq!(stats.active_crusades, 0);
    }

    #[tokio::test]
    async fn one_failing_fetch_degrades_only_its_sections() {
        let dir = TempDir::new().expect("tempdir");
        let (store, id) = store_with_player(&dir);
        store.put_raw_army(9_999, b"not an army").expect("plant");

        let state = assemble_game_state(&store, catalog(), &WorldConfig::default(), id)
            .await
            .expect("game state");

        assert!(!state.armies.is_ok());
        // nearby armies read the same tree
        assert!(!state.nearby_armies.is_ok());
        assert!(!state.stats.is_ok());
        assert!(state.companions.is_ok());
        assert!(state.territories.is_ok());
        assert!(state.crusades.is_ok());
        assert!(state.active_quests.is_ok());
        assert!(state.available_quests.is_ok());
        assert!(state.recent_events.is_ok());
        assert!(state.inventory.is_ok());
        assert!(state.factions.is_ok());
        assert!(state.world_events.is_ok());
        assert!(state.nearby_tiles.is_ok());
        assert!(state.active_combat.is_ok());
        assert_eq!(state.player.id, id);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["armies"]["status"], "unavailable");
        assert_eq!(json["territories"]["status"], "ok");
    }
}
