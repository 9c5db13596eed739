//! Turn settlement: collect territory output, pay army upkeep, advance the turn.

use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::logutil::escape_log;
use crate::metrics;
use crate::realm::errors::RealmError;
use crate::realm::formulas::{resource_production, Production};
use crate::realm::storage::RealmStore;
use crate::realm::types::{GameEventRecord, Importance};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnReport {
    pub turn_number: u32,
    pub income: i64,
    pub upkeep: i64,
    pub net_income: i64,
    pub production: Production,
    /// Treasury after settlement.
    pub gold: i64,
}

/// Settle one turn for `player_id`. Gold is floored at zero when upkeep
/// exceeds the treasury; food and materials are always added.
pub fn end_turn(store: &RealmStore, player_id: u64) -> Result<TurnReport, RealmError> {
    // Surface a missing player as NotFound before scanning holdings.
    store.get_player(player_id)?;
    let territories = store.territories_for_player(player_id)?;
    let armies = store.armies_for_player(player_id)?;

    let production = resource_production(&territories);
    let upkeep: i64 = armies.iter().map(|a| a.upkeep_cost).sum();
    let income = production.gold;
    let net_income = income - upkeep;

    let player = store.update_player(player_id, |player| {
        player.gold = (player.gold + net_income).max(0);
        player.food += production.food;
        player.materials += production.materials;
        player.turn_number = player.turn_number.saturating_add(1);
        player.last_turn_time = Utc::now();
        Ok(())
    })?;

    store.append_event(GameEventRecord::new(
        player_id,
        "turn_end",
        &format!(
            "Turn {} begins. Income {} gold, upkeep {} gold; +{} food, +{} materials.",
            player.turn_number, income, upkeep, production.food, production.materials
        ),
        "hourglass",
        if net_income < 0 {
            Importance::High
        } else {
            Importance::Low
        },
    ))?;
    metrics::inc_turns_settled();
    info!(
        "Settled turn {} for {}: net {} gold",
        player.turn_number,
        escape_log(&player.username),
        net_income
    );

    Ok(TurnReport {
        turn_number: player.turn_number,
        income,
        upkeep,
        net_income,
        production,
        gold: player.gold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyConfig;
    use crate::realm::roster::new_army;
    use crate::realm::storage::RealmStoreBuilder;
    use crate::realm::types::{Coord, PlayerRecord, TerritoryKind, TerritoryRecord, TroopCounts};
    use tempfile::TempDir;

    fn store() -> (TempDir, RealmStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        (dir, store)
    }

    #[test]
    fn income_minus_upkeep_lands_in_treasury() {
        let (_dir, store) = store();
        let mut player = PlayerRecord::new(0, "treasurer");
        player.gold = 1000;
        let player = store.create_player(player, "h").unwrap();

        let mut land = TerritoryRecord::new(player.id, "Fields", TerritoryKind::Village, Coord::new(0, 0));
        land.population = 1000;
        land.tax_income = 300;
        store.insert_territory(land).unwrap();
        store
            .insert_army(new_army(
                player.id,
                "Pikes",
                "",
                TroopCounts::new(10, 0, 0, 0),
                Coord::new(0, 0),
                &EconomyConfig::default(),
            ))
            .unwrap();

        let report = end_turn(&store, player.id).expect("settle");
        assert_eq!(report.income, 300);
        assert_eq!(report.upkeep, 20);
        assert_eq!(report.net_income, 280);
        assert_eq!(report.gold, 1280);
        assert_eq!(report.turn_number, 2);
        assert_eq!(report.production.food, 100);

        let stored = store.get_player(player.id).unwrap();
        assert_eq!(stored.gold, 1280);
        assert_eq!(stored.food, 100);
        assert_eq!(stored.materials, 50);
        assert_eq!(store.recent_events(player.id, 1).unwrap()[0].kind, "turn_end");
    }

    #[test]
    fn upkeep_never_drives_gold_negative() {
        let (_dir, store) = store();
        let mut player = PlayerRecord::new(0, "pauper");
        player.gold = 5;
        let player = store.create_player(player, "h").unwrap();
        store
            .insert_army(new_army(
                player.id,
                "Horde",
                "",
                TroopCounts::new(100, 0, 0, 0),
                Coord::new(0, 0),
                &EconomyConfig::default(),
            ))
            .unwrap();
        let report = end_turn(&store, player.id).expect("settle");
        assert_eq!(report.net_income, -200);
        assert_eq!(report.gold, 0);
    }

    #[test]
    fn unknown_player_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(end_turn(&store, 404), Err(RealmError::NotFound(_))));
    }
}
