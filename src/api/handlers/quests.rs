use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::api::error::{parse_id, ApiJson, ApiResult};
use crate::api::server::AppState;
use crate::realm::quest::QuestProgress;
use crate::realm::types::{PlayerQuestRecord, QuestDefinition};
use crate::realm::{abandon_quest, accept_quest, advance_quest, available_quests, blocking, AcceptQuestRequest};

pub async fn catalog(State(state): State<Arc<AppState>>) -> Json<Vec<QuestDefinition>> {
    Json(state.catalog.all().to_vec())
}

pub async fn available(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<QuestDefinition>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    let catalog = state.catalog.clone();
    let quests = blocking(move || {
        let player = store.get_player(player_id)?;
        let records = store.player_quests_for(player_id)?;
        Ok(available_quests(&catalog, &player, &records))
    })
    .await?;
    Ok(Json(quests))
}

pub async fn accept(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<AcceptQuestRequest>,
) -> ApiResult<(StatusCode, Json<PlayerQuestRecord>)> {
    let store = state.store.clone();
    let catalog = state.catalog.clone();
    let record = blocking(move || accept_quest(&store, &catalog, &body)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn player_quests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PlayerQuestRecord>>> {
    let player_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || store.player_quests_for(player_id)).await?))
}

pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<QuestProgress>> {
    let player_quest_id = parse_id(&id)?;
    let store = state.store.clone();
    let catalog = state.catalog.clone();
    let progress = blocking(move || advance_quest(&store, &catalog, player_quest_id)).await?;
    Ok(Json(progress))
}

pub async fn abandon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PlayerQuestRecord>> {
    let player_quest_id = parse_id(&id)?;
    let store = state.store.clone();
    Ok(Json(blocking(move || abandon_quest(&store, player_quest_id)).await?))
}
