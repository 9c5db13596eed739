//! Procedural generation of map regions.
//!
//! A region is the `(2r+1)²` square of tiles around an origin. Generation is
//! pure; persisting the result (and never regenerating it) is the store's job,
//! see [`crate::realm::storage::RealmStore::ensure_region`].

use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;

use crate::config::WorldConfig;
use crate::realm::types::{
    Coord, MapTileRecord, SettlementRecord, SettlementTier, Terrain, TILE_SCHEMA_VERSION,
};

const SETTLEMENT_NAMES: [&str; 15] = [
    "Ironhold",
    "Goldbrook",
    "Stormwatch",
    "Greenhill",
    "Brightwater",
    "Redstone",
    "Oakenford",
    "Silverdale",
    "Blackwater",
    "Whitehaven",
    "Thornfield",
    "Ravenshollow",
    "Dragonspire",
    "Wolfsburg",
    "Lionheart",
];

/// Distance beyond which random settlements may appear.
const SETTLEMENT_MIN_DISTANCE: u32 = 2;
const SETTLEMENT_CHANCE: f64 = 0.15;
const RESOURCE_CHANCE: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct MapParams {
    pub radius: u32,
    pub explore_radius: u32,
    pub quest_giver_faction: String,
}

impl Default for MapParams {
    fn default() -> Self {
        Self::from(&WorldConfig::default())
    }
}

impl From<&WorldConfig> for MapParams {
    fn from(world: &WorldConfig) -> Self {
        Self {
            radius: world.view_radius,
            explore_radius: world.explore_radius,
            quest_giver_faction: world.quest_giver_faction.clone(),
        }
    }
}

/// Output of one generation pass. Settlements have id 0 until stored.
#[derive(Debug, Clone)]
pub struct GeneratedRegion {
    pub origin: Coord,
    pub tiles: Vec<MapTileRecord>,
    pub settlements: Vec<SettlementRecord>,
}

impl GeneratedRegion {
    pub fn tile(&self, at: Coord) -> Option<&MapTileRecord> {
        self.tiles.iter().find(|t| t.x == at.x && t.y == at.y)
    }
}

/// One uniform draw against cumulative thresholds.
pub fn roll_terrain<R: Rng + ?Sized>(rng: &mut R) -> Terrain {
    let roll: f64 = rng.gen();
    terrain_for_roll(roll)
}

pub fn terrain_for_roll(roll: f64) -> Terrain {
    if roll < 0.15 {
        Terrain::Forest
    } else if roll < 0.25 {
        Terrain::Hills
    } else if roll < 0.35 {
        Terrain::Mountains
    } else if roll < 0.40 {
        Terrain::Water
    } else if roll < 0.45 {
        Terrain::Swamp
    } else {
        Terrain::Plains
    }
}

/// Terrain-appropriate resource yield. Each branch draws again, so the odds of
/// the later branches are conditional on the earlier ones failing.
pub fn roll_resources<R: Rng + ?Sized>(terrain: Terrain, rng: &mut R) -> HashMap<String, u32> {
    let mut resources = HashMap::new();
    if rng.gen::<f64>() >= RESOURCE_CHANCE {
        return resources;
    }
    let (name, amount) = match terrain {
        Terrain::Mountains => {
            if rng.gen::<f64>() < 0.05 {
                ("gems", rng.gen_range(1..=3))
            } else if rng.gen::<f64>() < 0.2 {
                ("iron", rng.gen_range(1..=5))
            } else {
                ("stone", rng.gen_range(2..=9))
            }
        }
        Terrain::Forest => {
            if rng.gen::<f64>() < 0.1 {
                ("gold", rng.gen_range(1..=2))
            } else {
                ("wood", rng.gen_range(3..=12))
            }
        }
        Terrain::Hills => {
            if rng.gen::<f64>() < 0.15 {
                ("iron", rng.gen_range(1..=4))
            } else {
                ("stone", rng.gen_range(1..=6))
            }
        }
        Terrain::Plains => {
            if rng.gen::<f64>() < 0.08 {
                ("gold", rng.gen_range(1..=3))
            } else {
                return resources;
            }
        }
        Terrain::Water | Terrain::Swamp => return resources,
    };
    resources.insert(name.to_string(), amount);
    resources
}

/// Settlement tier plus whether it hosts a quest giver.
fn roll_settlement<R: Rng + ?Sized>(rng: &mut R) -> (SettlementTier, bool) {
    let roll: f64 = rng.gen();
    if roll < 0.03 {
        (SettlementTier::Castle, true)
    } else if roll < 0.07 {
        (SettlementTier::City, rng.gen::<f64>() < 0.7)
    } else if roll < 0.11 {
        (SettlementTier::Town, rng.gen::<f64>() < 0.5)
    } else {
        (SettlementTier::Village, rng.gen::<f64>() < 0.3)
    }
}

fn settlement_name<R: Rng + ?Sized>(tier: SettlementTier, rng: &mut R) -> String {
    let base = SETTLEMENT_NAMES[rng.gen_range(0..SETTLEMENT_NAMES.len())];
    format!("{} {}", base, tier.suffix())
}

fn settlement_record<R: Rng + ?Sized>(
    tier: SettlementTier,
    at: Coord,
    faction: Option<String>,
    rng: &mut R,
) -> SettlementRecord {
    let population = tier.base_population() + rng.gen_range(0..=tier.base_population() / 2);
    SettlementRecord {
        id: 0,
        name: settlement_name(tier, rng),
        tier,
        x: at.x,
        y: at.y,
        population,
        wealth: population * 2,
        militia_size: (population / 20) as u32,
        faction,
        prosperity: rng.gen_range(30..=70),
        created_at: Utc::now(),
    }
}

/// Generate every tile of the region centered on `origin`.
pub fn generate_region<R: Rng + ?Sized>(
    origin: Coord,
    params: &MapParams,
    rng: &mut R,
) -> GeneratedRegion {
    let r = params.radius as i32;
    let side = (2 * params.radius + 1) as usize;
    let mut region = GeneratedRegion {
        origin,
        tiles: Vec::with_capacity(side * side),
        settlements: Vec::new(),
    };

    for x in origin.x.saturating_sub(r)..=origin.x.saturating_add(r) {
        for y in origin.y.saturating_sub(r)..=origin.y.saturating_add(r) {
            let at = Coord::new(x, y);
            let distance = origin.manhattan(at);
            let terrain = roll_terrain(rng);
            let resources = roll_resources(terrain, rng);

            let mut buildings = HashMap::new();
            let mut quest_giver = false;
            if at == origin {
                buildings.insert("castle".to_string(), 1);
                quest_giver = true;
            } else if distance > SETTLEMENT_MIN_DISTANCE && rng.gen::<f64>() < SETTLEMENT_CHANCE {
                let (tier, has_giver) = roll_settlement(rng);
                buildings.insert(tier.label().to_string(), 1);
                quest_giver = has_giver;
                let faction = has_giver.then(|| params.quest_giver_faction.clone());
                region
                    .settlements
                    .push(settlement_record(tier, at, faction, rng));
            }

            region.tiles.push(MapTileRecord {
                x,
                y,
                terrain,
                move_cost: terrain.move_cost(),
                has_quest_giver: quest_giver,
                quest_giver_faction: quest_giver.then(|| params.quest_giver_faction.clone()),
                resources,
                buildings,
                settlement_id: None,
                controlled_by: None,
                is_explored: distance <= params.explore_radius,
                schema_version: TILE_SCHEMA_VERSION,
            });
        }
    }
    region
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_terrain_band_is_reachable() {
        assert_eq!(terrain_for_roll(0.0), Terrain::Forest);
        assert_eq!(terrain_for_roll(0.20), Terrain::Hills);
        assert_eq!(terrain_for_roll(0.30), Terrain::Mountains);
        assert_eq!(terrain_for_roll(0.38), Terrain::Water);
        assert_eq!(terrain_for_roll(0.42), Terrain::Swamp);
        assert_eq!(terrain_for_roll(0.45), Terrain::Plains);
        assert_eq!(terrain_for_roll(0.99), Terrain::Plains);
    }

    #[test]
    fn region_is_square_around_origin() {
        let mut rng = StdRng::seed_from_u64(11);
        let region = generate_region(Coord::new(5, 5), &MapParams::default(), &mut rng);
        assert_eq!(region.tiles.len(), 121);
        let min_x = region.tiles.iter().map(|t| t.x).min().unwrap();
        let max_y = region.tiles.iter().map(|t| t.y).max().unwrap();
        assert_eq!(min_x, 0);
        assert_eq!(max_y, 10);
    }

    #[test]
    fn center_is_a_castle_with_quest_giver() {
        let mut rng = StdRng::seed_from_u64(5);
        let region = generate_region(Coord::new(-3, 8), &MapParams::default(), &mut rng);
        let center = region.tile(Coord::new(-3, 8)).expect("center tile");
        assert_eq!(center.buildings.get("castle"), Some(&1));
        assert!(center.has_quest_giver);
        assert_eq!(center.quest_giver_faction.as_deref(), Some("Kingdom of Valor"));
    }

    #[test]
    fn settlements_only_appear_beyond_distance_two() {
        let origin = Coord::new(0, 0);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let region = generate_region(origin, &MapParams::default(), &mut rng);
            for settlement in &region.settlements {
                let at = Coord::new(settlement.x, settlement.y);
                assert!(origin.manhattan(at) > 2);
                let tile = region.tile(at).expect("tile under settlement");
                assert_eq!(tile.buildings.get(settlement.tier.label()), Some(&1));
                assert!(settlement.name.ends_with(settlement.tier.suffix()));
            }
        }
    }

    #[test]
    fn only_tiles_within_explore_radius_start_explored() {
        let origin = Coord::new(5, 5);
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let region = generate_region(origin, &MapParams::default(), &mut rng);
            assert_eq!(region.tiles.len(), 121);
            for tile in &region.tiles {
                let at = Coord::new(tile.x, tile.y);
                assert_eq!(
                    tile.is_explored,
                    origin.manhattan(at) <= 2,
                    "tile ({}, {})",
                    tile.x,
                    tile.y
                );
            }
            assert_eq!(region.tiles.iter().filter(|t| t.is_explored).count(), 13);
        }
    }

    #[test]
    fn region_at_the_coordinate_edge_is_clipped() {
        let mut rng = StdRng::seed_from_u64(3);
        let origin = Coord::new(i32::MAX, i32::MIN);
        let region = generate_region(origin, &MapParams::default(), &mut rng);
        assert_eq!(region.tiles.len(), 36);
        assert!(region.tile(origin).is_some());
    }

    #[test]
    fn move_cost_matches_terrain() {
        let mut rng = StdRng::seed_from_u64(99);
        let region = generate_region(Coord::new(0, 0), &MapParams::default(), &mut rng);
        for tile in &region.tiles {
            assert_eq!(tile.move_cost, tile.terrain.move_cost());
        }
    }

    #[test]
    fn water_and_swamp_never_yield_resources() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            assert!(roll_resources(Terrain::Water, &mut rng).is_empty());
            assert!(roll_resources(Terrain::Swamp, &mut rng).is_empty());
        }
    }

    #[test]
    fn resource_amounts_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..2000 {
            for (name, amount) in roll_resources(Terrain::Mountains, &mut rng) {
                match name.as_str() {
                    "gems" => assert!((1..=3).contains(&amount)),
                    "iron" => assert!((1..=5).contains(&amount)),
                    "stone" => assert!((2..=9).contains(&amount)),
                    other => panic!("unexpected mountain resource {}", other),
                }
            }
            for (name, amount) in roll_resources(Terrain::Forest, &mut rng) {
                match name.as_str() {
                    "gold" => assert!((1..=2).contains(&amount)),
                    "wood" => assert!((3..=12).contains(&amount)),
                    other => panic!("unexpected forest resource {}", other),
                }
            }
        }
    }
}
