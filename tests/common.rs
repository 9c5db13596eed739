//! Shared fixtures: a realm in a temp dir and a router wired to it.

use argon2::{Algorithm, Argon2, Params, Version};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use kingsreach::api::{build_router, AppState};
use kingsreach::config::Config;
use kingsreach::realm::{AccountService, QuestCatalog, RealmStore};

pub struct TestRealm {
    // Held so the store directory outlives the router.
    _dir: TempDir,
    pub state: Arc<AppState>,
    pub router: Router,
}

/// Argon2 with the smallest accepted cost so registration stays fast.
pub fn cheap_argon2() -> Argon2<'static> {
    let params = Params::new(8, 1, 1, None).expect("argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

pub fn test_realm() -> TestRealm {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = RealmStore::open(dir.path().join("realm")).expect("open store");
    let config = Config::default();
    let accounts = AccountService::with_hasher(store.clone(), cheap_argon2(), &config);
    let catalog = QuestCatalog::builtin().expect("builtin quests");
    let state = Arc::new(AppState::with_accounts(store, catalog, config, accounts));
    let router = build_router(state.clone());
    TestRealm {
        _dir: dir,
        state,
        router,
    }
}

impl TestRealm {
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    /// Register a player and return its id.
    pub async fn register(&self, username: &str) -> u64 {
        let (status, body) = self
            .post(
                "/api/register",
                serde_json::json!({ "username": username, "password": "longenough1" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
        body["id"].as_u64().expect("player id")
    }
}
