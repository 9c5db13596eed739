mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::test_realm;

#[tokio::test]
async fn crusade_locks_the_army() {
    let realm = test_realm();
    let id = realm.register("marcus").await;
    let (_, armies) = realm.get(&format!("/api/armies/player/{}", id)).await;
    let army_id = armies[0]["id"].as_u64().unwrap();

    let crusade = json!({
        "playerId": id,
        "armyId": army_id,
        "name": "Eastern March",
        "targetLocation": "Blackwater",
        "objective": "raid",
        "durationHours": 12
    });
    let (status, started) = realm.post("/api/crusades", crusade.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["status"], "active");
    assert_eq!(started["description"], "");

    let (status, body) = realm.post("/api/crusades", crusade).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "Conflict");

    let (status, _) = realm
        .post(&format!("/api/armies/{}/move", army_id), json!({ "x": 7, "y": 7 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, crusades) = realm.get(&format!("/api/crusades/player/{}", id)).await;
    assert_eq!(crusades.as_array().unwrap().len(), 1);

    let (status, _) = realm
        .post(
            "/api/crusades",
            json!({
                "playerId": id,
                "armyId": army_id,
                "name": "Too Short",
                "targetLocation": "Nowhere",
                "objective": "conquest",
                "durationHours": 0
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn army_edits_recompute_strength() {
    let realm = test_realm();
    let id = realm.register("nora").await;
    let (status, army) = realm
        .post(
            "/api/armies",
            json!({
                "playerId": id,
                "name": "Scouts",
                "troops": { "heavyInfantry": 0, "archers": 10, "cavalry": 0, "siegeEngines": 0 }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(army["totalStrength"], 80);
    assert_eq!(army["positionX"], 5);
    let army_id = army["id"].as_u64().unwrap();

    let (status, patched) = realm
        .send(
            "PATCH",
            &format!("/api/armies/{}", army_id),
            Some(json!({ "troops": { "heavyInfantry": 0, "archers": 10, "cavalry": 2, "siegeEngines": 0 } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["totalStrength"], 110);

    let (status, _) = realm.send("DELETE", &format!("/api/armies/{}", army_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = realm.send("DELETE", &format!("/api/armies/{}", army_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn building_upgrades_cost_more_each_level() {
    let realm = test_realm();
    let id = realm.register("oscar").await;
    let base = realm.state.config.economy.building_upgrade_base_cost;
    let (_, territories) = realm.get(&format!("/api/territories/player/{}", id)).await;
    let capital = territories[0]["id"].as_u64().unwrap();

    let (status, upgraded) = realm
        .post(
            &format!("/api/territories/{}/upgrade", capital),
            json!({ "building": "Market" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upgraded["cost"], 2 * base);
    assert_eq!(upgraded["territory"]["buildings"]["market"], 2);
    assert_eq!(upgraded["player"]["gold"], 5000 - 2 * base);

    let (status, efficiency) = realm
        .get(&format!("/api/territories/{}/efficiency", capital))
        .await;
    assert_eq!(status, StatusCode::OK);
    let value = efficiency["efficiency"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&value));
}

#[tokio::test]
async fn companion_roster_is_capped() {
    let realm = test_realm();
    let id = realm.register("petra").await;
    let cap = realm.state.config.world.max_companions;

    // The starting companion already takes one slot.
    for _ in 1..cap {
        let (status, hired) = realm
            .post(
                "/api/hire-companion",
                json!({ "playerId": id, "companionType": "squire", "cost": 100 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", hired);
    }
    let (status, _) = realm
        .post(
            "/api/companions",
            json!({ "playerId": id, "companionType": "cleric" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, roster) = realm.get(&format!("/api/companions/player/{}", id)).await;
    assert_eq!(roster.as_array().unwrap().len(), cap);

    let (_, state) = realm.get(&format!("/api/game-state/{}", id)).await;
    assert_eq!(state["player"]["gold"], 5000 - 100 * (cap as i64 - 1));
}

#[tokio::test]
async fn one_open_encounter_at_a_time() {
    let realm = test_realm();
    let id = realm.register("quinn").await;

    let (status, none) = realm.get(&format!("/api/combat/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(none.is_null());

    let start = json!({ "playerId": id, "encounterType": "bandits", "enemyStrength": 300 });
    let (status, encounter) = realm.post("/api/combat/start", start.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(encounter["enemyData"]["strength"], 300);

    let (status, _) = realm.post("/api/combat/start", start).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, active) = realm.get(&format!("/api/combat/{}", id)).await;
    assert_eq!(active["id"], encounter["id"]);
}

#[tokio::test]
async fn simulated_battles() {
    let realm = test_realm();
    let (status, outcome) = realm
        .post(
            "/api/combat/simulate",
            json!({ "attackerStrength": 300, "defenderStrength": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["winProbability"], 0.75);
    let rate = outcome["lossRate"].as_f64().unwrap();
    assert!((0.10..0.30).contains(&rate));
    assert_eq!(
        outcome["attackerLosses"].as_i64().unwrap(),
        (300.0 * rate).floor() as i64
    );

    let (status, body) = realm
        .post(
            "/api/combat/simulate",
            json!({ "attackerStrength": 0, "defenderStrength": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InvalidInput");
}

#[tokio::test]
async fn world_events_are_listed_while_active() {
    let realm = test_realm();
    let (status, created) = realm
        .post(
            "/api/world-events",
            json!({
                "name": "Harvest Festival",
                "kind": "festival",
                "effects": { "food": 50 },
                "durationHours": 24
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["isActive"], true);

    let (_, events) = realm.get("/api/world-events").await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "Harvest Festival");
}

#[tokio::test]
async fn crusade_ending_past_the_calendar_is_rejected() {
    let realm = test_realm();
    let id = realm.register("otto").await;
    let (_, armies) = realm.get(&format!("/api/armies/player/{}", id)).await;
    let army_id = armies[0]["id"].as_u64().unwrap();

    let (status, body) = realm
        .post(
            "/api/crusades",
            json!({
                "playerId": id,
                "armyId": army_id,
                "name": "Endless March",
                "targetLocation": "The Far Edge",
                "objective": "resources",
                "durationHours": 4_000_000_000u32
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InvalidInput");

    let (_, crusades) = realm.get(&format!("/api/crusades/player/{}", id)).await;
    assert!(crusades.as_array().unwrap().is_empty());
    let (_, armies) = realm.get(&format!("/api/armies/player/{}", id)).await;
    assert_eq!(armies[0]["status"], "idle");

    let (status, _) = realm.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn world_event_ending_past_the_calendar_is_rejected() {
    let realm = test_realm();
    let (status, body) = realm
        .post(
            "/api/world-events",
            json!({
                "name": "Long Night",
                "kind": "omen",
                "durationHours": 4_000_000_000u32
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InvalidInput");

    let (_, events) = realm.get("/api/world-events").await;
    assert!(events.as_array().unwrap().is_empty());
}
