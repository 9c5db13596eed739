//! Kingdoms, guilds, chat, bulletin boards and the trade board.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::error::{parse_id, ApiError, ApiJson, ApiQuery, ApiResult};
use crate::api::server::AppState;
use crate::realm::blocking;
use crate::realm::types::{
    BulletinQuestRecord, BulletinStatus, ChatChannelRecord, ChatMessageRecord, Coord,
    GameEventRecord, GuildRecord, Importance, KingdomRecord, TradeOrderRecord, TradeOrderType,
};
use crate::validation::{sanitize_optional_text, sanitize_text, validate_display_name, TextError};

const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 200;

fn invalid(e: TextError) -> ApiError {
    ApiError::invalid(e.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KingdomRequest {
    pub name: String,
    pub ruler_id: u64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub description: String,
}

fn default_color() -> String {
    "#8b0000".to_string()
}

pub async fn list_kingdoms(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<KingdomRecord>>> {
    let store = state.store.clone();
    Ok(Json(blocking(move || store.list_kingdoms()).await?))
}

pub async fn create_kingdom(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<KingdomRequest>,
) -> ApiResult<(StatusCode, Json<KingdomRecord>)> {
    let kingdom = KingdomRecord {
        id: 0,
        name: validate_display_name("name", &body.name).map_err(invalid)?,
        ruler_id: body.ruler_id,
        color: validate_display_name("color", &body.color).map_err(invalid)?,
        description: sanitize_optional_text("description", &body.description).map_err(invalid)?,
        treasury: 0,
        influence: 0,
        regions: Vec::new(),
        founded_at: Utc::now(),
    };
    let store = state.store.clone();
    let kingdom = blocking(move || {
        let ruler = store.get_player(kingdom.ruler_id)?;
        let kingdom = store.insert_kingdom(kingdom)?;
        store.append_event(GameEventRecord::new(
            ruler.id,
            "kingdom_founded",
            &format!("The kingdom of {} has been founded.", kingdom.name),
            "crown",
            Importance::High,
        ))?;
        Ok(kingdom)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(kingdom)))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub x: i32,
    pub y: i32,
}

pub async fn claim_tile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ClaimRequest>,
) -> ApiResult<Json<KingdomRecord>> {
    let kingdom_id = parse_id(&id)?;
    let store = state.store.clone();
    let kingdom = blocking(move || store.claim_tile(kingdom_id, Coord::new(body.x, body.y))).await?;
    Ok(Json(kingdom))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildRequest {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub leader_player_id: u64,
}

pub async fn list_guilds(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<GuildRecord>>> {
    let store = state.store.clone();
    Ok(Json(blocking(move || store.list_guilds()).await?))
}

pub async fn create_guild(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<GuildRequest>,
) -> ApiResult<(StatusCode, Json<GuildRecord>)> {
    let guild = GuildRecord {
        id: 0,
        name: validate_display_name("name", &body.name).map_err(invalid)?,
        kind: validate_display_name("kind", &body.kind).map_err(invalid)?,
        description: sanitize_optional_text("description", &body.description).map_err(invalid)?,
        leader_player_id: body.leader_player_id,
        created_at: Utc::now(),
    };
    let store = state.store.clone();
    let guild = blocking(move || {
        store.get_player(guild.leader_player_id)?;
        store.insert_guild(guild)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(guild)))
}

pub async fn chat_channels(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ChatChannelRecord>>> {
    let store = state.store.clone();
    Ok(Json(blocking(move || store.list_chat_channels()).await?))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<usize>,
}

pub async fn channel_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<MessageQuery>,
) -> ApiResult<Json<Vec<ChatMessageRecord>>> {
    let channel_id = parse_id(&id)?;
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).min(MAX_MESSAGE_LIMIT);
    let store = state.store.clone();
    Ok(Json(blocking(move || store.channel_messages(channel_id, limit)).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub channel_id: u64,
    pub player_id: u64,
    pub message: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "text".to_string()
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessageRecord>)> {
    let message = ChatMessageRecord {
        id: 0,
        channel_id: body.channel_id,
        player_id: body.player_id,
        message: sanitize_text("message", &body.message).map_err(invalid)?,
        message_type: body.message_type,
        created_at: Utc::now(),
    };
    let store = state.store.clone();
    let message = blocking(move || {
        store.get_player(message.player_id)?;
        store.post_chat_message(message)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

pub async fn list_bulletin_quests(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LocationQuery>,
) -> ApiResult<Json<Vec<BulletinQuestRecord>>> {
    let store = state.store.clone();
    let quests = blocking(move || store.bulletin_quests(query.location.as_deref())).await?;
    Ok(Json(quests))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinRequest {
    pub author_id: u64,
    pub board_location: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: HashMap<String, String>,
    #[serde(default)]
    pub reward_gold: i64,
}

pub async fn create_bulletin_quest(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<BulletinRequest>,
) -> ApiResult<(StatusCode, Json<BulletinQuestRecord>)> {
    if body.reward_gold < 0 {
        return Err(ApiError::invalid("rewardGold must not be negative"));
    }
    let quest = BulletinQuestRecord {
        id: 0,
        author_id: body.author_id,
        board_location: validate_display_name("boardLocation", &body.board_location).map_err(invalid)?,
        title: validate_display_name("title", &body.title).map_err(invalid)?,
        description: sanitize_optional_text("description", &body.description).map_err(invalid)?,
        requirements: body.requirements,
        reward_gold: body.reward_gold,
        status: BulletinStatus::Open,
        accepted_by: None,
        accepted_at: None,
        created_at: Utc::now(),
    };
    let store = state.store.clone();
    let quest = blocking(move || {
        store.get_player(quest.author_id)?;
        store.insert_bulletin_quest(quest)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBulletinRequest {
    pub player_id: u64,
}

pub async fn accept_bulletin_quest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AcceptBulletinRequest>,
) -> ApiResult<Json<BulletinQuestRecord>> {
    let quest_id = parse_id(&id)?;
    let store = state.store.clone();
    let quest = blocking(move || {
        store.get_player(body.player_id)?;
        store.accept_bulletin_quest(quest_id, body.player_id)
    })
    .await?;
    Ok(Json(quest))
}

pub async fn list_trade_orders(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LocationQuery>,
) -> ApiResult<Json<Vec<TradeOrderRecord>>> {
    let store = state.store.clone();
    let orders = blocking(move || store.trade_orders(query.location.as_deref())).await?;
    Ok(Json(orders))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrderRequest {
    pub player_id: u64,
    pub location: String,
    pub order_type: TradeOrderType,
    pub resource: String,
    pub quantity: u32,
    pub price_per_unit: i64,
}

/// Post a buy or sell order. Orders are listings only; matching happens
/// between players outside the server.
pub async fn create_trade_order(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<TradeOrderRequest>,
) -> ApiResult<(StatusCode, Json<TradeOrderRecord>)> {
    if body.quantity == 0 {
        return Err(ApiError::invalid("quantity must be positive"));
    }
    if body.price_per_unit < 0 {
        return Err(ApiError::invalid("pricePerUnit must not be negative"));
    }
    let order = TradeOrderRecord {
        id: 0,
        player_id: body.player_id,
        location: validate_display_name("location", &body.location).map_err(invalid)?,
        order_type: body.order_type,
        resource: validate_display_name("resource", &body.resource).map_err(invalid)?,
        quantity: body.quantity,
        price_per_unit: body.price_per_unit,
        created_at: Utc::now(),
    };
    let store = state.store.clone();
    let order = blocking(move || {
        store.get_player(order.player_id)?;
        store.insert_trade_order(order)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(order)))
}
