//! Recruitable army presets, hireable companion classes and the holdings every
//! new player starts with.

use chrono::Utc;
use std::collections::HashMap;

use crate::config::{EconomyConfig, NewPlayerConfig};
use crate::realm::errors::RealmError;
use crate::realm::formulas::{army_strength, army_upkeep};
use crate::realm::types::{
    ArmyRecord, ArmyStatus, CompanionRecord, Coord, GameEventRecord, Importance, TerritoryKind,
    TerritoryRecord, TroopCounts, ARMY_SCHEMA_VERSION,
};

/// Build an army whose derived totals come from its composition.
pub fn new_army(
    player_id: u64,
    name: &str,
    description: &str,
    troops: TroopCounts,
    at: Coord,
    economy: &EconomyConfig,
) -> ArmyRecord {
    ArmyRecord {
        id: 0,
        player_id,
        name: name.to_string(),
        description: description.to_string(),
        territory_id: None,
        position_x: at.x,
        position_y: at.y,
        movement: None,
        troops,
        total_strength: army_strength(&troops, &economy.unit_strength),
        upkeep_cost: army_upkeep(&troops, &economy.unit_upkeep),
        morale: 100,
        status: ArmyStatus::Idle,
        created_at: Utc::now(),
        schema_version: ARMY_SCHEMA_VERSION,
    }
}

/// Recompute strength and upkeep after the composition changed.
pub fn refresh_army_totals(army: &mut ArmyRecord, economy: &EconomyConfig) {
    army.total_strength = army_strength(&army.troops, &economy.unit_strength);
    army.upkeep_cost = army_upkeep(&army.troops, &economy.unit_upkeep);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmyPreset {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub troops: TroopCounts,
}

pub static ARMY_PRESETS: [ArmyPreset; 5] = [
    ArmyPreset {
        key: "knight",
        label: "Knight",
        description: "A regiment of heavily armored mounted knights",
        troops: TroopCounts {
            heavy_infantry: 0,
            archers: 0,
            cavalry: 10,
            siege_engines: 0,
        },
    },
    ArmyPreset {
        key: "infantry",
        label: "Infantry",
        description: "A regiment of shield-bearing foot soldiers",
        troops: TroopCounts {
            heavy_infantry: 10,
            archers: 0,
            cavalry: 0,
            siege_engines: 0,
        },
    },
    ArmyPreset {
        key: "archer",
        label: "Archer",
        description: "A regiment of longbowmen with a small escort",
        troops: TroopCounts {
            heavy_infantry: 2,
            archers: 10,
            cavalry: 0,
            siege_engines: 0,
        },
    },
    ArmyPreset {
        key: "cavalry",
        label: "Cavalry",
        description: "A fast regiment of light horse",
        troops: TroopCounts {
            heavy_infantry: 1,
            archers: 0,
            cavalry: 6,
            siege_engines: 0,
        },
    },
    ArmyPreset {
        key: "siege",
        label: "Siege",
        description: "A train of siege engines and their crews",
        troops: TroopCounts {
            heavy_infantry: 0,
            archers: 0,
            cavalry: 0,
            siege_engines: 4,
        },
    },
];

pub fn army_preset(kind: &str) -> Result<&'static ArmyPreset, RealmError> {
    let wanted = kind.trim().to_ascii_lowercase();
    ARMY_PRESETS
        .iter()
        .find(|preset| preset.key == wanted)
        .ok_or_else(|| RealmError::InvalidInput(format!("unknown army type: {}", kind)))
}

/// Army raised by `recruit-army`; the store fills in owner and position.
pub fn recruited_army(kind: &str, economy: &EconomyConfig) -> Result<ArmyRecord, RealmError> {
    let preset = army_preset(kind)?;
    Ok(new_army(
        0,
        &format!("{} Regiment", preset.label),
        preset.description,
        preset.troops,
        Coord::new(0, 0),
        economy,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionClass {
    pub key: &'static str,
    pub name: &'static str,
    pub class: &'static str,
    pub background: &'static str,
    pub health: i64,
    pub attack: i64,
    pub defense: i64,
    pub loyalty: i32,
}

pub static COMPANION_CLASSES: [CompanionClass; 5] = [
    CompanionClass {
        key: "knight",
        name: "Sir Galahad",
        class: "Knight",
        background: "Noble Knight",
        health: 120,
        attack: 25,
        defense: 20,
        loyalty: 75,
    },
    CompanionClass {
        key: "squire",
        name: "Squire Thomas",
        class: "Squire",
        background: "Common Folk",
        health: 80,
        attack: 15,
        defense: 12,
        loyalty: 75,
    },
    CompanionClass {
        key: "ranger",
        name: "Elwyn the Ranger",
        class: "Ranger",
        background: "Forest Warden",
        health: 90,
        attack: 22,
        defense: 10,
        loyalty: 65,
    },
    CompanionClass {
        key: "cleric",
        name: "Brother Anselm",
        class: "Cleric",
        background: "Temple Acolyte",
        health: 85,
        attack: 10,
        defense: 14,
        loyalty: 85,
    },
    CompanionClass {
        key: "mercenary",
        name: "Brom Ironfist",
        class: "Mercenary",
        background: "Sellsword",
        health: 110,
        attack: 24,
        defense: 16,
        loyalty: 50,
    },
];

pub fn companion_class(kind: &str) -> Result<&'static CompanionClass, RealmError> {
    let wanted = kind.trim().to_ascii_lowercase();
    COMPANION_CLASSES
        .iter()
        .find(|class| class.key == wanted)
        .ok_or_else(|| RealmError::InvalidInput(format!("unknown companion type: {}", kind)))
}

pub fn new_companion(player_id: u64, class: &CompanionClass) -> CompanionRecord {
    CompanionRecord {
        id: 0,
        player_id,
        name: class.name.to_string(),
        class: class.class.to_string(),
        level: 1,
        experience: 0,
        health: class.health,
        max_health: class.health,
        attack: class.attack,
        defense: class.defense,
        wealth: 0,
        background: class.background.to_string(),
        is_active: true,
        loyalty: class.loyalty,
        morale: 75,
        skills: HashMap::new(),
        equipment: HashMap::new(),
        created_at: Utc::now(),
    }
}

/// Everything granted on registration besides the player row itself.
#[derive(Debug, Clone)]
pub struct StartingHoldings {
    pub capital: TerritoryRecord,
    pub companion: CompanionRecord,
    pub guard: ArmyRecord,
    pub welcome: GameEventRecord,
}

pub fn starting_holdings(
    player_id: u64,
    new_player: &NewPlayerConfig,
    economy: &EconomyConfig,
) -> StartingHoldings {
    let spawn = Coord::new(new_player.spawn_x, new_player.spawn_y);

    let mut capital = TerritoryRecord::new(player_id, "Royal Capital", TerritoryKind::Capital, spawn);
    capital.population = 5000;
    capital.garrison = 500;
    capital.tax_income = 500;
    capital.fortification_level = 2;
    capital.buildings = ["castle", "barracks", "market", "temple"]
        .iter()
        .map(|name| (name.to_string(), 1))
        .collect();

    let companion = CompanionRecord {
        id: 0,
        player_id,
        name: "Sir Gareth".to_string(),
        class: "Warrior".to_string(),
        level: 1,
        experience: 0,
        health: 80,
        max_health: 80,
        attack: 15,
        defense: 10,
        wealth: 100,
        background: "A loyal knight who has served your family for years. Skilled in combat and unwavering in loyalty.".to_string(),
        is_active: true,
        loyalty: 80,
        morale: 70,
        skills: HashMap::new(),
        equipment: HashMap::new(),
        created_at: Utc::now(),
    };

    let guard = new_army(
        player_id,
        "Royal Guard",
        "Your personal guard unit",
        TroopCounts::new(50, 30, 20, 2),
        spawn,
        economy,
    );

    let welcome = GameEventRecord::new(
        player_id,
        "welcome",
        "Welcome to the realm! Your journey as a noble begins now.",
        "crown",
        Importance::High,
    );

    StartingHoldings {
        capital,
        companion,
        guard,
        welcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_derive_strength_from_composition() {
        let economy = EconomyConfig::default();
        let knights = recruited_army("Knight", &economy).expect("knight");
        assert_eq!(knights.name, "Knight Regiment");
        assert_eq!(knights.total_strength, 150);
        assert_eq!(knights.upkeep_cost, 30);
        for kind in ["infantry", "archer", "cavalry", "siege"] {
            let army = recruited_army(kind, &economy).expect(kind);
            assert_eq!(army.total_strength, 100, "{}", kind);
        }
    }

    #[test]
    fn unknown_kinds_are_invalid_input() {
        let economy = EconomyConfig::default();
        assert!(matches!(
            recruited_army("dragon", &economy),
            Err(RealmError::InvalidInput(_))
        ));
        assert!(matches!(
            companion_class("wizard"),
            Err(RealmError::InvalidInput(_))
        ));
    }

    #[test]
    fn starting_guard_uses_configured_tables() {
        let holdings =
            starting_holdings(9, &NewPlayerConfig::default(), &EconomyConfig::default());
        assert_eq!(holdings.guard.total_strength, 50 * 10 + 30 * 8 + 20 * 15 + 2 * 25);
        assert_eq!(holdings.guard.upkeep_cost, 50 * 2 + 30 + 20 * 3 + 2 * 5);
        assert_eq!(holdings.guard.position_x, 5);
        assert_eq!(holdings.capital.building_level("market"), 1);
        assert_eq!(holdings.companion.name, "Sir Gareth");
        assert_eq!(holdings.welcome.importance, Importance::High);
    }

    #[test]
    fn refresh_recomputes_after_edit() {
        let economy = EconomyConfig::default();
        let mut army = recruited_army("infantry", &economy).unwrap();
        army.troops.archers = 5;
        refresh_army_totals(&mut army, &economy);
        assert_eq!(army.total_strength, 140);
        assert_eq!(army.upkeep_cost, 25);
    }
}
