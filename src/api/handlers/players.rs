//! Accounts, the aggregate game state, and actions that spend from or settle a
//! player's treasury.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use log::info;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{parse_id, ApiError, ApiJson, ApiResult};
use crate::api::server::AppState;
use crate::logutil::escape_log;
use crate::metrics;
use crate::realm::roster::{companion_class, new_companion, recruited_army};
use crate::realm::types::{
    ArmyRecord, CompanionRecord, Coord, GameEventRecord, Importance, PlayerPatch, PlayerRecord,
    WORLD_BOUND,
};
use crate::realm::{assemble_game_state, blocking, economy, GameState, MapParams, TurnReport};
use crate::validation::{validate_display_name, TextError};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Credentials>,
) -> ApiResult<(StatusCode, Json<PlayerRecord>)> {
    let player = state.accounts.register(&body.username, &body.password).await?;
    Ok((StatusCode::CREATED, Json(player)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Credentials>,
) -> ApiResult<Json<PlayerRecord>> {
    let player = state.accounts.login(&body.username, &body.password).await?;
    Ok(Json(player))
}

pub async fn game_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<GameState>> {
    let player_id = parse_id(&id)?;
    let snapshot = assemble_game_state(
        &state.store,
        state.catalog.clone(),
        &state.config.world,
        player_id,
    )
    .await?;
    Ok(Json(snapshot))
}

pub async fn patch_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(mut patch): ApiJson<PlayerPatch>,
) -> ApiResult<Json<PlayerRecord>> {
    let player_id = parse_id(&id)?;
    if let Some(name) = &patch.name {
        patch.name = Some(validate_display_name("name", name).map_err(invalid)?);
    }
    if let Some(title) = &patch.title {
        patch.title = Some(validate_display_name("title", title).map_err(invalid)?);
    }
    let store = state.store.clone();
    let player = blocking(move || {
        store.update_player(player_id, |player| {
            patch.apply(player);
            Ok(())
        })
    })
    .await?;
    Ok(Json(player))
}

fn invalid(e: TextError) -> ApiError {
    ApiError::invalid(e.to_string())
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub x: i32,
    pub y: i32,
}

/// Teleport-style move: any destination inside the world bound is taken as
/// given. The surrounding region is generated and explored before the new
/// position is saved.
pub async fn move_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<MoveRequest>,
) -> ApiResult<Json<PlayerRecord>> {
    let player_id = parse_id(&id)?;
    let destination = Coord::new(body.x, body.y);
    if !destination.in_world() {
        return Err(ApiError::invalid(format!(
            "destination ({}, {}) is outside the world (|x|, |y| <= {})",
            destination.x, destination.y, WORLD_BOUND
        )));
    }
    let store = state.store.clone();
    let world = state.config.world.clone();
    let player = blocking(move || {
        store.get_player(player_id)?;
        store.ensure_region(destination, &MapParams::from(&world), &mut thread_rng())?;
        store.explore_around(destination, world.explore_radius)?;
        let player = store.update_player(player_id, |player| {
            player.position_x = destination.x;
            player.position_y = destination.y;
            player.movement = None;
            Ok(())
        })?;
        store.append_event(GameEventRecord::new(
            player_id,
            "movement",
            &format!("You traveled to ({}, {}).", destination.x, destination.y),
            "map",
            Importance::Low,
        ))?;
        Ok(player)
    })
    .await?;
    Ok(Json(player))
}

pub async fn end_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TurnReport>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    let report = blocking(move || economy::end_turn(&store, player_id)).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitRequest {
    pub player_id: u64,
    pub army_type: String,
    pub cost: i64,
}

#[derive(Debug, Serialize)]
pub struct Recruited {
    pub player: PlayerRecord,
    pub army: ArmyRecord,
}

/// Gold is checked and deducted in the same transaction that inserts the
/// army; on `InsufficientGold` nothing is written.
pub async fn recruit_army(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RecruitRequest>,
) -> ApiResult<(StatusCode, Json<Recruited>)> {
    let army = recruited_army(&body.army_type, &state.config.economy)?;
    let store = state.store.clone();
    let (player, army) = blocking(move || {
        let (player, army) = store.recruit_army(body.player_id, body.cost, army)?;
        store.append_event(GameEventRecord::new(
            player.id,
            "army_recruited",
            &format!("{} has been raised for {} gold.", army.name, body.cost),
            "swords",
            Importance::Normal,
        ))?;
        Ok((player, army))
    })
    .await?;
    metrics::add_gold_spent(body.cost);
    info!(
        "Player {} recruited {} (strength {})",
        escape_log(&player.username),
        escape_log(&army.name),
        army.total_strength
    );
    Ok((StatusCode::CREATED, Json(Recruited { player, army })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HireRequest {
    pub player_id: u64,
    pub companion_type: String,
    pub cost: i64,
}

#[derive(Debug, Serialize)]
pub struct Hired {
    pub player: PlayerRecord,
    pub companion: CompanionRecord,
}

pub async fn hire_companion(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<HireRequest>,
) -> ApiResult<(StatusCode, Json<Hired>)> {
    let class = companion_class(&body.companion_type)?;
    let companion = new_companion(body.player_id, class);
    let roster_cap = state.config.world.max_companions;
    let store = state.store.clone();
    let (player, companion) = blocking(move || {
        let (player, companion) =
            store.hire_companion(body.player_id, body.cost, companion, roster_cap)?;
        store.append_event(GameEventRecord::new(
            player.id,
            "companion_hired",
            &format!("{} has joined your retinue.", companion.name),
            "shield",
            Importance::Normal,
        ))?;
        Ok((player, companion))
    })
    .await?;
    metrics::add_gold_spent(body.cost);
    Ok((StatusCode::CREATED, Json(Hired { player, companion })))
}
