//! Pure game formulas: army valuation, territory output and combat odds.
//!
//! Nothing in here touches storage. Randomised functions take the RNG as an
//! argument so callers (and tests) control the source of randomness.

use rand::Rng;
use serde::Serialize;

use crate::config::UnitTable;
use crate::realm::types::{ArmyRecord, CampaignStatus, CrusadeRecord, TerritoryRecord, TroopCounts};

fn weighted(troops: &TroopCounts, table: &UnitTable) -> i64 {
    i64::from(troops.heavy_infantry) * table.heavy_infantry
        + i64::from(troops.archers) * table.archers
        + i64::from(troops.cavalry) * table.cavalry
        + i64::from(troops.siege_engines) * table.siege_engines
}

/// Gold needed to raise `troops` from scratch.
pub fn army_cost(troops: &TroopCounts, costs: &UnitTable) -> i64 {
    weighted(troops, costs)
}

pub fn army_strength(troops: &TroopCounts, strength: &UnitTable) -> i64 {
    weighted(troops, strength)
}

pub fn army_upkeep(troops: &TroopCounts, upkeep: &UnitTable) -> i64 {
    weighted(troops, upkeep)
}

/// Tax collected as a percentage of what the territory could yield given its
/// population and building levels. Always within [0, 100].
pub fn territory_efficiency(territory: &TerritoryRecord) -> f64 {
    let population_factor = territory.population as f64 * 0.1;
    let building_bonus: f64 = territory
        .buildings
        .values()
        .map(|level| f64::from(*level) * 10.0)
        .sum();
    let max_income = population_factor + building_bonus;
    if max_income <= 0.0 {
        return 0.0;
    }
    let efficiency = territory.tax_income as f64 / max_income * 100.0;
    if !efficiency.is_finite() {
        return 0.0;
    }
    efficiency.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub gold: i64,
    pub food: i64,
    pub materials: i64,
}

/// Per-turn output of a set of territories. Markets add food, barracks add materials.
pub fn resource_production(territories: &[TerritoryRecord]) -> Production {
    let mut gold = 0i64;
    let mut food = 0f64;
    let mut materials = 0f64;
    for territory in territories {
        let market = f64::from(territory.building_level("market"));
        let barracks = f64::from(territory.building_level("barracks"));
        gold += territory.tax_income;
        food += territory.population as f64 * 0.1 + market * 50.0;
        materials += territory.population as f64 * 0.05 + barracks * 25.0;
    }
    Production {
        gold,
        food: food.floor() as i64,
        materials: materials.floor() as i64,
    }
}

pub fn building_upgrade_cost(current_level: u32, base_cost: i64) -> i64 {
    (i64::from(current_level) + 1) * base_cost
}

/// `attacker / (attacker + defender)`. Negative strengths count as zero.
/// Undefined (None) when both sides are zero.
pub fn attacker_win_probability(attacker: i64, defender: i64) -> Option<f64> {
    let a = attacker.max(0) as f64;
    let d = defender.max(0) as f64;
    let total = a + d;
    if total <= 0.0 {
        return None;
    }
    Some(a / total)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatOutcome {
    pub attacker_wins: bool,
    pub win_probability: f64,
    pub loss_rate: f64,
    pub attacker_losses: i64,
    pub defender_losses: i64,
}

/// Resolve a battle. One loss rate in [0.10, 0.30) is drawn and applied to both
/// sides regardless of the winner.
pub fn combat_resolution<R: Rng + ?Sized>(
    attacker: i64,
    defender: i64,
    rng: &mut R,
) -> Option<CombatOutcome> {
    let win_probability = attacker_win_probability(attacker, defender)?;
    let attacker_wins = rng.gen::<f64>() < win_probability;
    let loss_rate = rng.gen_range(0.10..0.30);
    Some(CombatOutcome {
        attacker_wins,
        win_probability,
        loss_rate,
        attacker_losses: (attacker.max(0) as f64 * loss_rate).floor() as i64,
        defender_losses: (defender.max(0) as f64 * loss_rate).floor() as i64,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_territories: usize,
    pub total_army_strength: i64,
    pub active_crusades: usize,
    pub total_income: i64,
    pub total_upkeep: i64,
    pub net_income: i64,
    pub economic_efficiency: f64,
}

pub fn game_stats(
    territories: &[TerritoryRecord],
    armies: &[ArmyRecord],
    crusades: &[CrusadeRecord],
) -> GameStats {
    let total_income: i64 = territories.iter().map(|t| t.tax_income).sum();
    let total_upkeep: i64 = armies.iter().map(|a| a.upkeep_cost).sum();
    let net_income = total_income - total_upkeep;
    let economic_efficiency = if total_income > 0 {
        (net_income as f64 / total_income as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    GameStats {
        total_territories: territories.len(),
        total_army_strength: armies.iter().map(|a| a.total_strength).sum(),
        active_crusades: crusades
            .iter()
            .filter(|c| c.status == CampaignStatus::Active)
            .count(),
        total_income,
        total_upkeep,
        net_income,
        economic_efficiency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::types::{Coord, TerritoryKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn territory(population: i64, tax: i64, buildings: &[(&str, u32)]) -> TerritoryRecord {
        let mut t = TerritoryRecord::new(1, "Test", TerritoryKind::Village, Coord::new(0, 0));
        t.population = population;
        t.tax_income = tax;
        t.buildings = buildings
            .iter()
            .map(|(name, level)| (name.to_string(), *level))
            .collect();
        t
    }

    #[test]
    fn royal_guard_valuation() {
        let guard = TroopCounts::new(50, 30, 20, 2);
        assert_eq!(army_strength(&guard, &UnitTable::new(10, 8, 15, 25)), 1090);
        assert_eq!(army_upkeep(&guard, &UnitTable::new(2, 1, 3, 5)), 200);
        assert_eq!(army_cost(&guard, &UnitTable::new(45, 35, 85, 200)), 6000);
    }

    #[test]
    fn efficiency_is_zero_for_empty_territory() {
        assert_eq!(territory_efficiency(&territory(0, 500, &[])), 0.0);
        assert_eq!(territory_efficiency(&territory(0, 0, &[])), 0.0);
    }

    #[test]
    fn efficiency_clamps_to_bounds() {
        assert_eq!(territory_efficiency(&territory(10, 1_000_000, &[])), 100.0);
        assert_eq!(territory_efficiency(&territory(1000, -50, &[])), 0.0);
        assert_eq!(
            territory_efficiency(&territory(i64::MAX, i64::MAX, &[("castle", u32::MAX)])),
            100.0
        );
        // 5000 * 0.1 + 4 * 10 = 540
        let capital = territory(
            5000,
            270,
            &[("castle", 1), ("barracks", 1), ("market", 1), ("temple", 1)],
        );
        assert!((territory_efficiency(&capital) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn production_floors_fractional_output() {
        let output = resource_production(&[
            territory(5000, 500, &[("market", 1), ("barracks", 1)]),
            territory(15, 7, &[]),
        ]);
        assert_eq!(output.gold, 507);
        // 500 + 50 + 1.5
        assert_eq!(output.food, 551);
        // 250 + 25 + 0.75
        assert_eq!(output.materials, 275);
    }

    #[test]
    fn upgrade_cost_scales_with_level() {
        assert_eq!(building_upgrade_cost(0, 500), 500);
        assert_eq!(building_upgrade_cost(3, 500), 2000);
    }

    #[test]
    fn zero_strength_battle_is_undefined() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(attacker_win_probability(0, 0), None);
        assert!(combat_resolution(0, 0, &mut rng).is_none());
        assert_eq!(attacker_win_probability(10, 0), Some(1.0));
    }

    #[test]
    fn equal_strengths_win_half_the_time() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let mut wins = 0;
        for _ in 0..trials {
            let outcome = combat_resolution(300, 300, &mut rng).expect("defined");
            assert_eq!(outcome.win_probability, 0.5);
            assert!((0.10..0.30).contains(&outcome.loss_rate));
            assert_eq!(outcome.attacker_losses, outcome.defender_losses);
            if outcome.attacker_wins {
                wins += 1;
            }
        }
        let ratio = wins as f64 / trials as f64;
        assert!((ratio - 0.5).abs() < 0.02, "ratio was {}", ratio);
    }

    #[test]
    fn losses_stay_within_rate_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let outcome = combat_resolution(1000, 400, &mut rng).expect("defined");
            assert!((100..300).contains(&outcome.attacker_losses));
            assert!((40..120).contains(&outcome.defender_losses));
        }
    }
}
