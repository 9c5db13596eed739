//! Armies, territories, companions, crusades and combat encounters.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::ends_after;
use crate::api::error::{parse_id, ApiError, ApiJson, ApiResult};
use crate::api::server::AppState;
use crate::metrics;
use crate::realm::formulas::{building_upgrade_cost, combat_resolution, territory_efficiency};
use crate::realm::roster::{companion_class, new_army, new_companion, refresh_army_totals};
use crate::realm::types::{
    ArmyRecord, ArmyStatus, CampaignStatus, CombatEncounterRecord, CombatStatus, CompanionRecord,
    Coord, CrusadeObjective, CrusadeRecord, GameEventRecord, Importance, PlayerRecord,
    TerritoryKind, TerritoryRecord, TroopCounts,
};
use crate::realm::{blocking, CombatOutcome, RealmError};
use crate::validation::{sanitize_optional_text, validate_display_name, TextError};

fn invalid(e: TextError) -> ApiError {
    ApiError::invalid(e.to_string())
}

// ----------------------------------------------------------------------------
// Armies
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArmyRequest {
    pub player_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub troops: TroopCounts,
    #[serde(default)]
    pub territory_id: Option<u64>,
    #[serde(default)]
    pub position_x: Option<i32>,
    #[serde(default)]
    pub position_y: Option<i32>,
}

/// Create an army directly. Strength and upkeep are always derived from the
/// composition; client-supplied totals are not accepted.
pub async fn create_army(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateArmyRequest>,
) -> ApiResult<(StatusCode, Json<ArmyRecord>)> {
    let name = validate_display_name("name", &body.name).map_err(invalid)?;
    let description = sanitize_optional_text("description", &body.description).map_err(invalid)?;
    let economy = state.config.economy.clone();
    let store = state.store.clone();
    let army = blocking(move || {
        let owner = store.get_player(body.player_id)?;
        let at = Coord::new(
            body.position_x.unwrap_or(owner.position_x),
            body.position_y.unwrap_or(owner.position_y),
        );
        let mut army = new_army(owner.id, &name, &description, body.troops, at, &economy);
        army.territory_id = body.territory_id;
        store.insert_army(army)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(army)))
}

pub async fn player_armies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ArmyRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.armies_for_player(player_id)).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmyPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub troops: Option<TroopCounts>,
    pub morale: Option<u32>,
    pub status: Option<ArmyStatus>,
    pub territory_id: Option<u64>,
}

pub async fn patch_army(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(mut patch): ApiJson<ArmyPatch>,
) -> ApiResult<Json<ArmyRecord>> {
    let army_id = parse_id(&id)?;
    if let Some(name) = &patch.name {
        patch.name = Some(validate_display_name("name", name).map_err(invalid)?);
    }
    let economy = state.config.economy.clone();
    let store = state.store.clone();
    let army = blocking(move || {
        store.update_army(army_id, |army| {
            if let Some(name) = &patch.name {
                army.name = name.clone();
            }
            if let Some(description) = &patch.description {
                army.description = description.clone();
            }
            if let Some(morale) = patch.morale {
                army.morale = morale;
            }
            if let Some(status) = patch.status {
                army.status = status;
            }
            if patch.territory_id.is_some() {
                army.territory_id = patch.territory_id;
            }
            if let Some(troops) = patch.troops {
                army.troops = troops;
                refresh_army_totals(army, &economy);
            }
            Ok(())
        })
    })
    .await?;
    Ok(Json(army))
}

pub async fn delete_army(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ArmyRecord>> {
    let army_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.delete_army(army_id)).await?))
}

#[derive(Debug, Deserialize)]
pub struct MoveTo {
    pub x: i32,
    pub y: i32,
}

/// Reposition an army. Armies away on crusade cannot be moved.
pub async fn move_army(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<MoveTo>,
) -> ApiResult<Json<ArmyRecord>> {
    let army_id = parse_id(&id)?;
    let store = state.store.clone();
    let army = blocking(move || {
        store.update_army(army_id, |army| {
            if army.status == ArmyStatus::Crusading {
                return Err(RealmError::InvalidInput(format!(
                    "army {} is on crusade",
                    army.id
                )));
            }
            army.position_x = body.x;
            army.position_y = body.y;
            army.movement = None;
            army.status = ArmyStatus::Idle;
            Ok(())
        })
    })
    .await?;
    Ok(Json(army))
}

// ----------------------------------------------------------------------------
// Territories
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerritoryRequest {
    pub player_id: u64,
    pub name: String,
    #[serde(default)]
    pub kind: TerritoryKind,
    pub position_x: i32,
    pub position_y: i32,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub garrison: Option<i64>,
    #[serde(default)]
    pub tax_income: Option<i64>,
    #[serde(default)]
    pub buildings: HashMap<String, u32>,
}

pub async fn create_territory(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateTerritoryRequest>,
) -> ApiResult<(StatusCode, Json<TerritoryRecord>)> {
    let name = validate_display_name("name", &body.name).map_err(invalid)?;
    let store = state.store.clone();
    let territory = blocking(move || {
        store.get_player(body.player_id)?;
        let mut territory = TerritoryRecord::new(
            body.player_id,
            &name,
            body.kind,
            Coord::new(body.position_x, body.position_y),
        );
        if let Some(v) = body.population {
            territory.population = v;
        }
        if let Some(v) = body.garrison {
            territory.garrison = v;
        }
        if let Some(v) = body.tax_income {
            territory.tax_income = v;
        }
        territory.buildings = body.buildings;
        store.insert_territory(territory)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(territory)))
}

pub async fn player_territories(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TerritoryRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.territories_for_player(player_id)).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerritoryPatch {
    pub name: Option<String>,
    pub kind: Option<TerritoryKind>,
    pub population: Option<i64>,
    pub garrison: Option<i64>,
    pub tax_income: Option<i64>,
    pub fortification_level: Option<u32>,
    pub buildings: Option<HashMap<String, u32>>,
}

pub async fn patch_territory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(mut patch): ApiJson<TerritoryPatch>,
) -> ApiResult<Json<TerritoryRecord>> {
    let territory_id = parse_id(&id)?;
    if let Some(name) = &patch.name {
        patch.name = Some(validate_display_name("name", name).map_err(invalid)?);
    }
    let store = state.store.clone();
    let territory = blocking(move || {
        store.update_territory(territory_id, |t| {
            if let Some(name) = &patch.name {
                t.name = name.clone();
            }
            if let Some(kind) = patch.kind {
                t.kind = kind;
            }
            if let Some(v) = patch.population {
                t.population = v;
            }
            if let Some(v) = patch.garrison {
                t.garrison = v;
            }
            if let Some(v) = patch.tax_income {
                t.tax_income = v;
            }
            if let Some(v) = patch.fortification_level {
                t.fortification_level = v;
            }
            if let Some(buildings) = &patch.buildings {
                t.buildings = buildings.clone();
            }
            Ok(())
        })
    })
    .await?;
    Ok(Json(territory))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Efficiency {
    pub territory_id: u64,
    pub efficiency: f64,
}

pub async fn efficiency(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Efficiency>> {
    let territory_id = parse_id(&id)?;
    let store = state.store.clone();
    let territory = blocking(move || store.get_territory(territory_id)).await?;
    Ok(Json(Efficiency {
        territory_id,
        efficiency: territory_efficiency(&territory),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub building: String,
}

#[derive(Debug, Serialize)]
pub struct Upgraded {
    pub player: PlayerRecord,
    pub territory: TerritoryRecord,
    pub cost: i64,
}

/// Raise a building one level for `(level + 1) * base` gold.
pub async fn upgrade_building(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpgradeRequest>,
) -> ApiResult<Json<Upgraded>> {
    let territory_id = parse_id(&id)?;
    let building = body.building.trim().to_ascii_lowercase();
    if building.is_empty() {
        return Err(ApiError::invalid("building is required"));
    }
    let base = state.config.economy.building_upgrade_base_cost;
    let store = state.store.clone();
    let (player, territory, cost) = blocking(move || {
        let (player, territory, cost) = store.upgrade_building(territory_id, &building, |level| {
            building_upgrade_cost(level, base)
        })?;
        store.append_event(GameEventRecord::new(
            player.id,
            "building_upgraded",
            &format!(
                "The {} of {} is now level {}.",
                building,
                territory.name,
                territory.building_level(&building)
            ),
            "hammer",
            Importance::Normal,
        ))?;
        Ok((player, territory, cost))
    })
    .await?;
    metrics::add_gold_spent(cost);
    Ok(Json(Upgraded {
        player,
        territory,
        cost,
    }))
}

// ----------------------------------------------------------------------------
// Companions
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanionRequest {
    pub player_id: u64,
    pub companion_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Add a companion without charging for it. The roster cap still applies.
pub async fn create_companion(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateCompanionRequest>,
) -> ApiResult<(StatusCode, Json<CompanionRecord>)> {
    let class = companion_class(&body.companion_type)?;
    let mut companion = new_companion(body.player_id, class);
    if let Some(name) = &body.name {
        companion.name = validate_display_name("name", name).map_err(invalid)?;
    }
    let roster_cap = state.config.world.max_companions;
    let store = state.store.clone();
    let (_, companion) = blocking(move || {
        store.hire_companion(body.player_id, 0, companion, roster_cap)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(companion)))
}

pub async fn player_companions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CompanionRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.companions_for_player(player_id)).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub health: Option<i64>,
    pub loyalty: Option<i32>,
    pub morale: Option<i32>,
    pub equipment: Option<HashMap<String, String>>,
}

pub async fn patch_companion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(mut patch): ApiJson<CompanionPatch>,
) -> ApiResult<Json<CompanionRecord>> {
    let companion_id = parse_id(&id)?;
    if let Some(name) = &patch.name {
        patch.name = Some(validate_display_name("name", name).map_err(invalid)?);
    }
    let store = state.store.clone();
    let companion = blocking(move || {
        store.update_companion(companion_id, |c| {
            if let Some(name) = &patch.name {
                c.name = name.clone();
            }
            if let Some(active) = patch.is_active {
                c.is_active = active;
            }
            if let Some(health) = patch.health {
                c.health = health.min(c.max_health);
            }
            if let Some(loyalty) = patch.loyalty {
                c.loyalty = loyalty;
            }
            if let Some(morale) = patch.morale {
                c.morale = morale;
            }
            if let Some(equipment) = &patch.equipment {
                c.equipment = equipment.clone();
            }
            Ok(())
        })
    })
    .await?;
    Ok(Json(companion))
}

// ----------------------------------------------------------------------------
// Crusades
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrusadeRequest {
    pub player_id: u64,
    pub army_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target_location: String,
    #[serde(default)]
    pub target_x: Option<i32>,
    #[serde(default)]
    pub target_y: Option<i32>,
    pub objective: CrusadeObjective,
    pub duration_hours: u32,
    #[serde(default)]
    pub supply_cost: i64,
    #[serde(default)]
    pub rewards: HashMap<String, i64>,
}

/// Launch a crusade. The army must belong to the player and not already be
/// on crusade; it is marked crusading in the same transaction.
pub async fn start_crusade(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CrusadeRequest>,
) -> ApiResult<(StatusCode, Json<CrusadeRecord>)> {
    let name = validate_display_name("name", &body.name).map_err(invalid)?;
    let target = validate_display_name("targetLocation", &body.target_location).map_err(invalid)?;
    if body.duration_hours == 0 {
        return Err(ApiError::invalid("durationHours must be positive"));
    }
    let start = Utc::now();
    let end_time = ends_after(start, body.duration_hours)?;
    let crusade = CrusadeRecord {
        id: 0,
        player_id: body.player_id,
        army_id: body.army_id,
        name,
        description: sanitize_optional_text("description", &body.description).map_err(invalid)?,
        target_location: target,
        target_x: body.target_x,
        target_y: body.target_y,
        objective: body.objective,
        progress: 0,
        duration_hours: body.duration_hours,
        supply_cost: body.supply_cost,
        status: CampaignStatus::Active,
        rewards: body.rewards,
        start_time: start,
        end_time,
    };
    let store = state.store.clone();
    let crusade = blocking(move || {
        store.get_player(crusade.player_id)?;
        let crusade = store.start_crusade(crusade)?;
        store.append_event(GameEventRecord::new(
            crusade.player_id,
            "crusade_started",
            &format!(
                "The crusade '{}' marches on {}.",
                crusade.name, crusade.target_location
            ),
            "flag",
            Importance::High,
        ))?;
        Ok(crusade)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(crusade)))
}

pub async fn player_crusades(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CrusadeRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.crusades_for_player(player_id)).await?))
}

// ----------------------------------------------------------------------------
// Combat
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCombatRequest {
    pub player_id: u64,
    pub encounter_type: String,
    pub enemy_strength: i64,
    #[serde(default)]
    pub enemy_count: Option<i64>,
}

/// Open an encounter at the player's position. One unresolved encounter per player.
pub async fn start_combat(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<StartCombatRequest>,
) -> ApiResult<(StatusCode, Json<CombatEncounterRecord>)> {
    let kind = validate_display_name("encounterType", &body.encounter_type).map_err(invalid)?;
    if body.enemy_strength < 0 {
        return Err(ApiError::invalid("enemyStrength cannot be negative"));
    }
    let store = state.store.clone();
    let encounter = blocking(move || {
        let player = store.get_player(body.player_id)?;
        if let Some(existing) = store.active_combat(player.id)? {
            return Err(RealmError::Conflict(format!(
                "encounter {} is still unresolved",
                existing.id
            )));
        }
        let mut enemy_data = HashMap::new();
        enemy_data.insert("strength".to_string(), body.enemy_strength);
        if let Some(count) = body.enemy_count {
            enemy_data.insert("count".to_string(), count);
        }
        store.insert_combat(CombatEncounterRecord {
            id: 0,
            player_id: player.id,
            encounter_type: kind,
            position_x: player.position_x,
            position_y: player.position_y,
            enemy_data,
            status: CombatStatus::Active,
            current_turn: 1,
            battle_log: Vec::new(),
            created_at: Utc::now(),
        })
    })
    .await?;
    Ok((StatusCode::CREATED, Json(encounter)))
}

pub async fn active_combat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Option<CombatEncounterRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    let encounter = blocking(move || {
        store.get_player(player_id)?;
        store.active_combat(player_id)
    })
    .await?;
    Ok(Json(encounter))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub attacker_strength: i64,
    pub defender_strength: i64,
}

/// Roll a battle between two strengths. Nothing is persisted.
pub async fn simulate_combat(ApiJson(body): ApiJson<SimulateRequest>) -> ApiResult<Json<CombatOutcome>> {
    let outcome = combat_resolution(
        body.attacker_strength,
        body.defender_strength,
        &mut thread_rng(),
    )
    .ok_or_else(|| ApiError::invalid("at least one side needs positive strength"))?;
    Ok(Json(outcome))
}
