use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;
pub const ARMY_SCHEMA_VERSION: u8 = 1;
pub const TILE_SCHEMA_VERSION: u8 = 1;

/// Building name -> level. Keys are free-form ("castle", "market", ...).
pub type BuildingLevels = HashMap<String, u32>;
/// Resource name -> quantity.
pub type ResourceYield = HashMap<String, u32>;

/// Largest absolute x or y a player may move to.
pub const WORLD_BOUND: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: Coord) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    pub fn in_world(&self) -> bool {
        self.x.unsigned_abs() <= WORLD_BOUND && self.y.unsigned_abs() <= WORLD_BOUND
    }
}

/// In-flight movement toward a destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub to_x: i32,
    pub to_y: i32,
    pub ends_at: DateTime<Utc>,
}

// ============================================================================
// Players
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub title: String,
    pub level: u32,
    pub experience: i64,
    pub health: i64,
    pub max_health: i64,
    pub honor: i64,
    pub gold: i64,
    pub food: i64,
    pub materials: i64,
    pub population: i64,
    pub turn_number: u32,
    pub position_x: i32,
    pub position_y: i32,
    pub movement: Option<Movement>,
    pub faction_reputations: HashMap<String, i64>,
    pub last_turn_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerRecord {
    /// Fresh player with every counter at zero; callers apply configured starting values.
    pub fn new(id: u64, username: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            name: username.to_string(),
            title: "Knight".to_string(),
            level: 1,
            experience: 0,
            health: 100,
            max_health: 100,
            honor: 0,
            gold: 0,
            food: 0,
            materials: 0,
            population: 0,
            turn_number: 1,
            position_x: 0,
            position_y: 0,
            movement: None,
            faction_reputations: HashMap::new(),
            last_turn_time: now,
            created_at: now,
            updated_at: now,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn position(&self) -> Coord {
        Coord::new(self.position_x, self.position_y)
    }

    pub fn is_moving(&self) -> bool {
        self.movement.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Partial update accepted by `PATCH /api/players/{id}`. Identity, position and
/// turn counters are deliberately absent; they change through their own operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub title: Option<String>,
    pub health: Option<i64>,
    pub max_health: Option<i64>,
    pub honor: Option<i64>,
    pub gold: Option<i64>,
    pub food: Option<i64>,
    pub materials: Option<i64>,
    pub population: Option<i64>,
    pub experience: Option<i64>,
    pub faction_reputations: Option<HashMap<String, i64>>,
}

impl PlayerPatch {
    pub fn apply(&self, player: &mut PlayerRecord) {
        if let Some(name) = &self.name {
            player.name = name.clone();
        }
        if let Some(title) = &self.title {
            player.title = title.clone();
        }
        if let Some(v) = self.health {
            player.health = v;
        }
        if let Some(v) = self.max_health {
            player.max_health = v;
        }
        if let Some(v) = self.honor {
            player.honor = v;
        }
        if let Some(v) = self.gold {
            player.gold = v;
        }
        if let Some(v) = self.food {
            player.food = v;
        }
        if let Some(v) = self.materials {
            player.materials = v;
        }
        if let Some(v) = self.population {
            player.population = v;
        }
        if let Some(v) = self.experience {
            player.experience = v;
        }
        if let Some(reps) = &self.faction_reputations {
            for (faction, value) in reps {
                player.faction_reputations.insert(faction.clone(), *value);
            }
        }
    }
}

// ============================================================================
// Armies
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArmyStatus {
    #[default]
    Idle,
    Moving,
    Crusading,
    Defending,
}

/// Unit composition of an army.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TroopCounts {
    #[serde(default)]
    pub heavy_infantry: u32,
    #[serde(default)]
    pub archers: u32,
    #[serde(default)]
    pub cavalry: u32,
    #[serde(default)]
    pub siege_engines: u32,
}

impl TroopCounts {
    pub fn new(heavy_infantry: u32, archers: u32, cavalry: u32, siege_engines: u32) -> Self {
        Self {
            heavy_infantry,
            archers,
            cavalry,
            siege_engines,
        }
    }

    pub fn total_units(&self) -> u64 {
        u64::from(self.heavy_infantry)
            + u64::from(self.archers)
            + u64::from(self.cavalry)
            + u64::from(self.siege_engines)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArmyRecord {
    pub id: u64,
    pub player_id: u64,
    pub name: String,
    pub description: String,
    pub territory_id: Option<u64>,
    pub position_x: i32,
    pub position_y: i32,
    pub movement: Option<Movement>,
    pub troops: TroopCounts,
    /// Derived from `troops`; recomputed whenever the composition changes.
    pub total_strength: i64,
    /// Derived from `troops`; recomputed whenever the composition changes.
    pub upkeep_cost: i64,
    pub morale: u32,
    pub status: ArmyStatus,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ArmyRecord {
    pub fn position(&self) -> Coord {
        Coord::new(self.position_x, self.position_y)
    }
}

// ============================================================================
// Territories
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryKind {
    Capital,
    Fortress,
    #[default]
    Village,
    Outpost,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerritoryRecord {
    pub id: u64,
    pub player_id: u64,
    pub name: String,
    pub kind: TerritoryKind,
    pub population: i64,
    pub garrison: i64,
    pub tax_income: i64,
    pub fortification_level: u32,
    pub buildings: BuildingLevels,
    pub position_x: i32,
    pub position_y: i32,
    pub created_at: DateTime<Utc>,
}

impl TerritoryRecord {
    pub fn new(player_id: u64, name: &str, kind: TerritoryKind, at: Coord) -> Self {
        Self {
            id: 0,
            player_id,
            name: name.to_string(),
            kind,
            population: 1000,
            garrison: 100,
            tax_income: 100,
            fortification_level: 1,
            buildings: HashMap::new(),
            position_x: at.x,
            position_y: at.y,
            created_at: Utc::now(),
        }
    }

    pub fn building_level(&self, building: &str) -> u32 {
        self.buildings.get(building).copied().unwrap_or(0)
    }
}

// ============================================================================
// Companions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanionRecord {
    pub id: u64,
    pub player_id: u64,
    pub name: String,
    pub class: String,
    pub level: u32,
    pub experience: i64,
    pub health: i64,
    pub max_health: i64,
    pub attack: i64,
    pub defense: i64,
    pub wealth: i64,
    pub background: String,
    pub is_active: bool,
    /// Intended range 0-100, not clamped.
    pub loyalty: i32,
    /// Intended range 0-100, not clamped.
    pub morale: i32,
    pub skills: HashMap<String, u32>,
    pub equipment: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Crusades
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrusadeObjective {
    Conquest,
    Raid,
    Liberation,
    Resources,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrusadeRecord {
    pub id: u64,
    pub player_id: u64,
    pub army_id: u64,
    pub name: String,
    pub description: String,
    pub target_location: String,
    pub target_x: Option<i32>,
    pub target_y: Option<i32>,
    pub objective: CrusadeObjective,
    /// 0-100.
    pub progress: u8,
    pub duration_hours: u32,
    pub supply_cost: i64,
    pub status: CampaignStatus,
    pub rewards: HashMap<String, i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ============================================================================
// Quests
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestKind {
    Kill,
    Deliver,
    Escort,
    Gather,
    Explore,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Legendary,
}

/// Catalog entry. Lives in the read-only quest catalog, never in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestDefinition {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub faction: Option<String>,
    pub quest_giver_name: String,
    pub quest_type: QuestKind,
    pub difficulty: Difficulty,
    pub duration_hours: u32,
    pub gold_reward: i64,
    #[serde(default)]
    pub experience_reward: i64,
    #[serde(default)]
    pub honor_reward: i64,
    #[serde(default)]
    pub item_rewards: Vec<String>,
    #[serde(default)]
    pub faction_reputation_changes: HashMap<String, i64>,
    pub required_troops: i64,
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_chain_quest: bool,
    #[serde(default)]
    pub next_quest_id: Option<u64>,
    #[serde(default)]
    pub position_x: Option<i32>,
    #[serde(default)]
    pub position_y: Option<i32>,
}

fn default_required_level() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A player's acceptance record for a catalog quest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerQuestRecord {
    pub id: u64,
    pub player_id: u64,
    pub quest_id: u64,
    pub army_id: Option<u64>,
    pub status: CampaignStatus,
    pub current_objective: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl PlayerQuestRecord {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

// ============================================================================
// Map
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Plains,
    Forest,
    Hills,
    Mountains,
    Water,
    Swamp,
}

impl Terrain {
    /// Fixed movement cost lookup.
    pub fn move_cost(self) -> u32 {
        match self {
            Terrain::Plains => 1,
            Terrain::Forest | Terrain::Hills => 2,
            Terrain::Swamp => 3,
            Terrain::Mountains => 4,
            Terrain::Water => 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapTileRecord {
    pub x: i32,
    pub y: i32,
    pub terrain: Terrain,
    pub move_cost: u32,
    pub has_quest_giver: bool,
    pub quest_giver_faction: Option<String>,
    pub resources: ResourceYield,
    pub buildings: BuildingLevels,
    pub settlement_id: Option<u64>,
    /// Kingdom that has claimed the tile.
    pub controlled_by: Option<u64>,
    pub is_explored: bool,
    pub schema_version: u8,
}

impl MapTileRecord {
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTier {
    Castle,
    City,
    Town,
    Village,
}

impl SettlementTier {
    pub fn label(self) -> &'static str {
        match self {
            SettlementTier::Castle => "castle",
            SettlementTier::City => "city",
            SettlementTier::Town => "town",
            SettlementTier::Village => "village",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            SettlementTier::Castle => "Castle",
            SettlementTier::City => "City",
            SettlementTier::Town => "Town",
            SettlementTier::Village => "Village",
        }
    }

    /// Starting population for a freshly placed settlement of this tier.
    pub fn base_population(self) -> i64 {
        match self {
            SettlementTier::Castle => 800,
            SettlementTier::City => 2000,
            SettlementTier::Town => 600,
            SettlementTier::Village => 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub id: u64,
    pub name: String,
    pub tier: SettlementTier,
    pub x: i32,
    pub y: i32,
    pub population: i64,
    pub wealth: i64,
    pub militia_size: u32,
    pub faction: Option<String>,
    /// 0-100.
    pub prosperity: u8,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Player-scoped append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameEventRecord {
    pub id: u64,
    pub player_id: u64,
    pub kind: String,
    pub message: String,
    pub icon: String,
    pub importance: Importance,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl GameEventRecord {
    pub fn new(player_id: u64, kind: &str, message: &str, icon: &str, importance: Importance) -> Self {
        Self {
            id: 0,
            player_id,
            kind: kind.to_string(),
            message: message.to_string(),
            icon: icon.to_string(),
            importance,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldEventRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub position_x: Option<i32>,
    pub position_y: Option<i32>,
    pub radius: u32,
    pub effects: HashMap<String, i64>,
    pub duration_hours: u32,
    pub is_active: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Factions, items, inventory
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FactionRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub capital_x: i32,
    pub capital_y: i32,
    pub color: String,
    pub power: i64,
    pub wealth: i64,
    pub relations: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub rarity: String,
    pub description: String,
    pub value: i64,
    pub effects: HashMap<String, i64>,
    pub required_level: u32,
    pub is_stackable: bool,
    pub max_stack: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub id: u64,
    pub player_id: u64,
    pub item_id: u64,
    pub quantity: u32,
    pub is_equipped: bool,
    pub slot: Option<String>,
}

/// Inventory entry joined with its item definition.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub entry: InventoryEntry,
    pub item: ItemRecord,
}

// ============================================================================
// Combat
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombatStatus {
    #[default]
    Active,
    Won,
    Lost,
    Fled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombatEncounterRecord {
    pub id: u64,
    pub player_id: u64,
    pub encounter_type: String,
    pub position_x: i32,
    pub position_y: i32,
    /// Enemy composition and stats ("strength", "count", ...).
    pub enemy_data: HashMap<String, i64>,
    pub status: CombatStatus,
    pub current_turn: u32,
    pub battle_log: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Kingdoms, guilds, chat, trade, bulletin quests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KingdomRecord {
    pub id: u64,
    pub name: String,
    pub ruler_id: u64,
    pub color: String,
    pub description: String,
    pub treasury: i64,
    pub influence: i64,
    /// Claimed tiles.
    pub regions: Vec<Coord>,
    pub founded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuildRecord {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub leader_player_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatChannelRecord {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRecord {
    pub id: u64,
    pub channel_id: u64,
    pub player_id: u64,
    pub message: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeOrderType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrderRecord {
    pub id: u64,
    pub player_id: u64,
    pub location: String,
    pub order_type: TradeOrderType,
    pub resource: String,
    pub quantity: u32,
    pub price_per_unit: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BulletinStatus {
    #[default]
    Open,
    Accepted,
    Completed,
}

/// Player-authored quest pinned to a settlement or inn board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulletinQuestRecord {
    pub id: u64,
    pub author_id: u64,
    pub board_location: String,
    pub title: String,
    pub description: String,
    pub requirements: HashMap<String, String>,
    pub reward_gold: i64,
    pub status: BulletinStatus,
    pub accepted_by: Option<u64>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_move_costs_follow_fixed_lookup() {
        assert_eq!(Terrain::Plains.move_cost(), 1);
        assert_eq!(Terrain::Forest.move_cost(), 2);
        assert_eq!(Terrain::Hills.move_cost(), 2);
        assert_eq!(Terrain::Swamp.move_cost(), 3);
        assert_eq!(Terrain::Mountains.move_cost(), 4);
        assert_eq!(Terrain::Water.move_cost(), 5);
    }

    #[test]
    fn player_patch_only_touches_given_fields() {
        let mut player = PlayerRecord::new(1, "alice");
        player.gold = 500;
        player.faction_reputations.insert("Bandit Clan".into(), -5);
        let patch: PlayerPatch =
            serde_json::from_str(r#"{"title":"Baron","factionReputations":{"Dragon Cult":12}}"#)
                .expect("patch json");
        patch.apply(&mut player);
        assert_eq!(player.title, "Baron");
        assert_eq!(player.gold, 500);
        assert_eq!(player.faction_reputations["Bandit Clan"], -5);
        assert_eq!(player.faction_reputations["Dragon Cult"], 12);
    }

    #[test]
    fn player_json_uses_camel_case() {
        let player = PlayerRecord::new(3, "bob");
        let json = serde_json::to_value(&player).expect("json");
        assert!(json.get("positionX").is_some());
        assert!(json.get("turnNumber").is_some());
        assert!(json.get("password").is_none());
    }

    #[test]
    fn manhattan_distance() {
        assert_eq!(Coord::new(5, 5).manhattan(Coord::new(3, 6)), 3);
        assert_eq!(Coord::new(-2, 0).manhattan(Coord::new(2, 0)), 4);
    }
}
