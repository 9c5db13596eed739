//! Read-mostly views of the shared world plus service endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::ends_after;
use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery, ApiResult};
use crate::api::server::AppState;
use crate::metrics;
use crate::realm::types::{
    Coord, FactionRecord, GameEventRecord, InventoryItem, MapTileRecord, SettlementRecord,
    WorldEventRecord,
};
use crate::realm::{blocking, MapParams};
use crate::validation::{sanitize_optional_text, validate_display_name};

/// Largest settlement query rectangle, in tiles per side.
const MAX_RECT_SIDE: i64 = 200;
const MAX_EVENT_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub players: usize,
    pub tiles: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        players: state.store.count_players(),
        tiles: state.store.count_tiles(),
    })
}

pub async fn metrics_snapshot() -> Json<metrics::Snapshot> {
    Json(metrics::snapshot())
}

pub async fn inventory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.inventory_for(player_id)).await?))
}

pub async fn factions(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<FactionRecord>>> {
    let store = state.store.clone();
    Ok(Json(blocking(move || store.list_factions()).await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<GameEventRecord>>> {
    let player_id = parse_id(&id)?;
    let limit = query
        .limit
        .unwrap_or(state.config.world.recent_events_limit)
        .min(MAX_EVENT_LIMIT);
    let store = state.store.clone();
    Ok(Json(blocking(move || store.recent_events(player_id, limit)).await?))
}

pub async fn world_events(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<WorldEventRecord>>> {
    let store = state.store.clone();
    Ok(Json(blocking(move || store.active_world_events(Utc::now())).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEventRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    #[serde(default)]
    pub position_x: Option<i32>,
    #[serde(default)]
    pub position_y: Option<i32>,
    #[serde(default)]
    pub radius: u32,
    #[serde(default)]
    pub effects: HashMap<String, i64>,
    pub duration_hours: u32,
}

/// Announce a realm-wide event lasting `durationHours` from now.
pub async fn create_world_event(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<WorldEventRequest>,
) -> ApiResult<(StatusCode, Json<WorldEventRecord>)> {
    let name = validate_display_name("name", &body.name).map_err(|e| ApiError::invalid(e.to_string()))?;
    let description = sanitize_optional_text("description", &body.description)
        .map_err(|e| ApiError::invalid(e.to_string()))?;
    if body.duration_hours == 0 {
        return Err(ApiError::invalid("durationHours must be positive"));
    }
    let starts_at = Utc::now();
    let ends_at = ends_after(starts_at, body.duration_hours)?;
    let event = WorldEventRecord {
        id: 0,
        name,
        description,
        kind: body.kind,
        position_x: body.position_x,
        position_y: body.position_y,
        radius: body.radius,
        effects: body.effects,
        duration_hours: body.duration_hours,
        is_active: true,
        starts_at,
        ends_at: Some(ends_at),
    };
    let store = state.store.clone();
    let event = blocking(move || store.insert_world_event(event)).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Tiles around the player's position, generating the region on first view.
pub async fn player_map(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MapTileRecord>>> {
    let player_id = parse_id(&id)?;
    let params = MapParams::from(&state.config.world);
    let store = state.store.clone();
    let tiles = blocking(move || {
        let center = store.get_player(player_id)?.position();
        store.ensure_region(center, &params, &mut thread_rng())?;
        store.tiles_around(center, params.radius)
    })
    .await?;
    Ok(Json(tiles))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectQuery {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

pub async fn settlements(
    State(state): State<Arc<AppState>>,
    ApiQuery(rect): ApiQuery<RectQuery>,
) -> ApiResult<Json<Vec<SettlementRecord>>> {
    let width = i64::from(rect.max_x) - i64::from(rect.min_x);
    let height = i64::from(rect.max_y) - i64::from(rect.min_y);
    if width < 0 || height < 0 {
        return Err(ApiError::invalid("min must not exceed max"));
    }
    if width > MAX_RECT_SIDE || height > MAX_RECT_SIDE {
        return Err(ApiError::invalid(format!(
            "rectangle too large (max {} tiles per side)",
            MAX_RECT_SIDE
        )));
    }
    let store = state.store.clone();
    let found = blocking(move || {
        store.settlements_in_rect(
            Coord::new(rect.min_x, rect.min_y),
            Coord::new(rect.max_x, rect.max_y),
        )
    })
    .await?;
    Ok(Json(found))
}
