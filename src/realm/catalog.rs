//! Read-only reference data: the quest catalog plus the factions and items
//! seeded into a fresh store.
//!
//! The JSON under `data/seeds/` is compiled into the binary. The quest catalog
//! can be replaced at startup by pointing `[quests] catalog_path` at another file;
//! either way it is loaded once and never mutated afterwards.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::realm::errors::RealmError;
use crate::realm::types::{FactionRecord, ItemRecord, QuestDefinition};

const BUILTIN_QUESTS: &str = include_str!("../../data/seeds/quests.json");
const BUILTIN_FACTIONS: &str = include_str!("../../data/seeds/factions.json");
const BUILTIN_ITEMS: &str = include_str!("../../data/seeds/items.json");

fn parse_seed<T: DeserializeOwned>(text: &str, origin: &str) -> Result<T, RealmError> {
    serde_json::from_str(text).map_err(|e| {
        RealmError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse {}: {}", origin, e),
        ))
    })
}

#[derive(Debug, Clone)]
pub struct QuestCatalog {
    quests: Vec<QuestDefinition>,
    by_id: HashMap<u64, usize>,
}

impl QuestCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, RealmError> {
        Self::from_json(BUILTIN_QUESTS, "built-in quests.json")
    }

    /// Load from `path` when given, otherwise fall back to the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, RealmError> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                Self::from_json(&contents, &path.display().to_string())
            }
            None => Self::builtin(),
        }
    }

    pub fn from_json(text: &str, origin: &str) -> Result<Self, RealmError> {
        let quests: Vec<QuestDefinition> = parse_seed(text, origin)?;
        Self::from_definitions(quests)
    }

    pub fn from_definitions(quests: Vec<QuestDefinition>) -> Result<Self, RealmError> {
        let mut by_id = HashMap::with_capacity(quests.len());
        for (index, quest) in quests.iter().enumerate() {
            if quest.id == 0 {
                return Err(RealmError::InvalidInput(format!(
                    "quest '{}' has id 0",
                    quest.name
                )));
            }
            if by_id.insert(quest.id, index).is_some() {
                return Err(RealmError::InvalidInput(format!(
                    "duplicate quest id {} in catalog",
                    quest.id
                )));
            }
        }
        for quest in &quests {
            if let Some(next) = quest.next_quest_id {
                if !by_id.contains_key(&next) {
                    return Err(RealmError::InvalidInput(format!(
                        "quest {} chains to unknown quest {}",
                        quest.id, next
                    )));
                }
            }
        }
        Ok(Self { quests, by_id })
    }

    pub fn get(&self, id: u64) -> Option<&QuestDefinition> {
        self.by_id.get(&id).map(|&index| &self.quests[index])
    }

    pub fn all(&self) -> &[QuestDefinition] {
        &self.quests
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    /// The quest whose completion unlocks `id`, if `id` is part of a chain.
    pub fn predecessor_of(&self, id: u64) -> Option<&QuestDefinition> {
        self.quests.iter().find(|q| q.next_quest_id == Some(id))
    }
}

#[derive(Debug, Deserialize)]
struct FactionSeed {
    name: String,
    description: String,
    capital: (i32, i32),
    color: String,
    power: i64,
    wealth: i64,
    #[serde(default)]
    relations: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSeed {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    rarity: String,
    description: String,
    value: i64,
    #[serde(default)]
    effects: HashMap<String, i64>,
    #[serde(default)]
    required_level: Option<u32>,
    #[serde(default)]
    stackable: bool,
    #[serde(default)]
    max_stack: Option<u32>,
}

/// Factions inserted into a new store. Ids are assigned on insert.
pub fn seed_factions() -> Result<Vec<FactionRecord>, RealmError> {
    let seeds: Vec<FactionSeed> = parse_seed(BUILTIN_FACTIONS, "built-in factions.json")?;
    Ok(seeds
        .into_iter()
        .map(|seed| FactionRecord {
            id: 0,
            name: seed.name,
            description: seed.description,
            capital_x: seed.capital.0,
            capital_y: seed.capital.1,
            color: seed.color,
            power: seed.power,
            wealth: seed.wealth,
            relations: seed.relations,
        })
        .collect())
}

pub fn seed_items() -> Result<Vec<ItemRecord>, RealmError> {
    let seeds: Vec<ItemSeed> = parse_seed(BUILTIN_ITEMS, "built-in items.json")?;
    Ok(seeds
        .into_iter()
        .map(|seed| ItemRecord {
            id: 0,
            name: seed.name,
            kind: seed.kind,
            rarity: seed.rarity,
            description: seed.description,
            value: seed.value,
            effects: seed.effects,
            required_level: seed.required_level.unwrap_or(1),
            is_stackable: seed.stackable,
            max_stack: seed.max_stack.unwrap_or(1),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::types::{Difficulty, QuestKind};
    use std::io::Write;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = QuestCatalog::builtin().expect("builtin catalog");
        assert!(catalog.len() >= 2);
        let bandits = catalog.get(1).expect("quest 1");
        assert_eq!(bandits.name, "Clear the Bandit Camp");
        assert_eq!(bandits.quest_type, QuestKind::Kill);
        assert_eq!(bandits.difficulty, Difficulty::Medium);
        assert_eq!(bandits.objectives.len(), 3);
        assert!(catalog.get(999).is_none());
    }

    #[test]
    fn chain_predecessor_is_found() {
        let catalog = QuestCatalog::builtin().expect("builtin catalog");
        assert_eq!(catalog.predecessor_of(3).map(|q| q.id), Some(1));
        assert!(catalog.predecessor_of(2).is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let text = r#"[
            {"id": 1, "name": "A", "description": "", "questGiverName": "x", "questType": "kill",
             "difficulty": "easy", "durationHours": 1, "goldReward": 1, "requiredTroops": 0},
            {"id": 1, "name": "B", "description": "", "questGiverName": "x", "questType": "kill",
             "difficulty": "easy", "durationHours": 1, "goldReward": 1, "requiredTroops": 0}
        ]"#;
        let err = QuestCatalog::from_json(text, "test").unwrap_err();
        assert!(matches!(err, RealmError::InvalidInput(_)));
    }

    #[test]
    fn external_catalog_overrides_builtin() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"[{{"id": 42, "name": "Hunt the Wyvern", "description": "d", "questGiverName": "Old Tom",
                 "questType": "kill", "difficulty": "hard", "durationHours": 6, "goldReward": 900,
                 "requiredTroops": 100}}]"#
        )
        .expect("write");
        let catalog = QuestCatalog::load(Some(file.path())).expect("load");
        assert_eq!(catalog.len(), 1);
        let wyvern = catalog.get(42).expect("quest 42");
        assert_eq!(wyvern.required_level, 1);
        assert!(wyvern.is_active);
    }

    #[test]
    fn seeds_parse() {
        let factions = seed_factions().expect("factions");
        assert_eq!(factions.len(), 3);
        assert_eq!(factions[0].name, "Kingdom of Valor");
        let items = seed_items().expect("items");
        let potion = items.iter().find(|i| i.name == "Healing Potion").expect("potion");
        assert!(potion.is_stackable);
        assert_eq!(potion.max_stack, 10);
    }
}
