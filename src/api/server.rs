//! Router assembly, shared state, request logging and the serve loop.

use axum::extract::{MatchedPath, Request};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::Router;
use log::{info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use crate::api::handlers::{military, players, quests, social, world};
use crate::config::Config;
use crate::metrics;
use crate::realm::{AccountService, QuestCatalog, RealmStore};

/// State shared by every handler.
pub struct AppState {
    pub store: RealmStore,
    pub catalog: Arc<QuestCatalog>,
    pub config: Arc<Config>,
    pub accounts: AccountService,
}

impl AppState {
    pub fn new(store: RealmStore, catalog: QuestCatalog, config: Config) -> Self {
        let accounts = AccountService::new(store.clone(), &config);
        Self::with_accounts(store, catalog, config, accounts)
    }

    pub fn with_accounts(
        store: RealmStore,
        catalog: QuestCatalog,
        config: Config,
        accounts: AccountService,
    ) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            config: Arc::new(config),
            accounts,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(world::health))
        .route("/api/metrics", get(world::metrics_snapshot))
        // players and accounts
        .route("/api/register", post(players::register))
        .route("/api/auth/register", post(players::register))
        .route("/api/login", post(players::login))
        .route("/api/auth/login", post(players::login))
        .route("/api/game-state/{id}", get(players::game_state))
        .route("/api/players/{id}", patch(players::patch_player))
        .route("/api/players/{id}/move", post(players::move_player))
        .route("/api/players/{id}/end-turn", post(players::end_turn))
        .route("/api/recruit-army", post(players::recruit_army))
        .route("/api/hire-companion", post(players::hire_companion))
        // armies, territories, companions, crusades, combat
        .route("/api/armies", post(military::create_army))
        .route("/api/armies/player/{id}", get(military::player_armies))
        .route(
            "/api/armies/{id}",
            patch(military::patch_army).delete(military::delete_army),
        )
        .route("/api/armies/{id}/move", post(military::move_army))
        .route("/api/territories", post(military::create_territory))
        .route(
            "/api/territories/player/{id}",
            get(military::player_territories),
        )
        .route("/api/territories/{id}", patch(military::patch_territory))
        .route(
            "/api/territories/{id}/efficiency",
            get(military::efficiency),
        )
        .route(
            "/api/territories/{id}/upgrade",
            post(military::upgrade_building),
        )
        .route("/api/companions", post(military::create_companion))
        .route(
            "/api/companions/player/{id}",
            get(military::player_companions),
        )
        .route("/api/companions/{id}", patch(military::patch_companion))
        .route("/api/crusades", post(military::start_crusade))
        .route(
            "/api/crusades/player/{id}",
            get(military::player_crusades),
        )
        .route("/api/combat/start", post(military::start_combat))
        .route("/api/combat/simulate", post(military::simulate_combat))
        .route("/api/combat/{id}", get(military::active_combat))
        // quests
        .route("/api/quests", get(quests::catalog))
        .route("/api/quests/available/{id}", get(quests::available))
        .route("/api/player-quests", post(quests::accept))
        .route("/api/player-quests/{id}", get(quests::player_quests))
        .route("/api/player-quests/{id}/advance", post(quests::advance))
        .route("/api/player-quests/{id}/abandon", post(quests::abandon))
        // world
        .route("/api/inventory/{id}", get(world::inventory))
        .route("/api/factions", get(world::factions))
        .route("/api/events/{id}", get(world::events))
        .route(
            "/api/world-events",
            get(world::world_events).post(world::create_world_event),
        )
        .route("/api/map/{id}", get(world::player_map))
        .route("/api/settlements", get(world::settlements))
        // kingdoms, guilds, chat, bulletin quests, trade
        .route(
            "/api/kingdoms",
            get(social::list_kingdoms).post(social::create_kingdom),
        )
        .route("/api/kingdoms/{id}/claim", post(social::claim_tile))
        .route(
            "/api/guilds",
            get(social::list_guilds).post(social::create_guild),
        )
        .route("/api/chat/channels", get(social::chat_channels))
        .route(
            "/api/chat/channels/{id}/messages",
            get(social::channel_messages),
        )
        .route("/api/chat/messages", post(social::post_message))
        .route(
            "/api/bulletin-quests",
            get(social::list_bulletin_quests).post(social::create_bulletin_quest),
        )
        .route(
            "/api/bulletin-quests/{id}/accept",
            post(social::accept_bulletin_quest),
        )
        .route(
            "/api/trade-orders",
            get(social::list_trade_orders).post(social::create_trade_order),
        )
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Log each request with its status and latency, tag it with a request id
/// and feed the per-route counters.
async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let request_id = uuid::Uuid::new_v4().to_string();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    metrics::record_request(&method, &route, status, elapsed);
    if status >= 500 {
        warn!(
            "{} {} -> {} in {}ms [{}]",
            method,
            path,
            status,
            elapsed.as_millis(),
            request_id
        );
    } else {
        info!(
            "{} {} -> {} in {}ms [{}]",
            method,
            path,
            status,
            elapsed.as_millis(),
            request_id
        );
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.bind_address, state.config.server.port
    )
    .parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(
        "{} listening on http://{}",
        state.config.server.name,
        listener.local_addr()?
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped");
    Ok(())
}
