use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Transactional;

use crate::realm::catalog;
use crate::realm::errors::RealmError;
use crate::realm::mapgen::{generate_region, GeneratedRegion, MapParams};
use crate::realm::types::{
    ArmyRecord, ArmyStatus, BulletinQuestRecord, BulletinStatus, ChatChannelRecord,
    ChatMessageRecord, CombatEncounterRecord, CombatStatus, CompanionRecord, Coord,
    CrusadeRecord, FactionRecord, GameEventRecord, GuildRecord, InventoryEntry, InventoryItem,
    ItemRecord, KingdomRecord, MapTileRecord, PlayerQuestRecord, PlayerRecord, SettlementRecord,
    TerritoryRecord, TradeOrderRecord, WorldEventRecord, ARMY_SCHEMA_VERSION,
    PLAYER_SCHEMA_VERSION, TILE_SCHEMA_VERSION,
};

const TREE_PLAYERS: &str = "realm_players";
const TREE_USERNAMES: &str = "realm_usernames";
const TREE_CREDENTIALS: &str = "realm_credentials";
const TREE_ARMIES: &str = "realm_armies";
const TREE_TERRITORIES: &str = "realm_territories";
const TREE_COMPANIONS: &str = "realm_companions";
const TREE_ROSTERS: &str = "realm_companion_rosters";
const TREE_CRUSADES: &str = "realm_crusades";
const TREE_PLAYER_QUESTS: &str = "realm_player_quests";
const TREE_QUEST_CLAIMS: &str = "realm_quest_claims";
const TREE_TILES: &str = "realm_tiles";
const TREE_SETTLEMENTS: &str = "realm_settlements";
const TREE_EVENTS: &str = "realm_events";
const TREE_FACTIONS: &str = "realm_factions";
const TREE_ITEMS: &str = "realm_items";
const TREE_INVENTORY: &str = "realm_inventory";
const TREE_WORLD_EVENTS: &str = "realm_world_events";
const TREE_COMBAT: &str = "realm_combat";
const TREE_KINGDOMS: &str = "realm_kingdoms";
const TREE_GUILDS: &str = "realm_guilds";
const TREE_CHAT_CHANNELS: &str = "realm_chat_channels";
const TREE_CHAT_MESSAGES: &str = "realm_chat_messages";
const TREE_TRADE_ORDERS: &str = "realm_trade_orders";
const TREE_BULLETINS: &str = "realm_bulletin_quests";

type TxResult<T> = ConflictableTransactionResult<T, RealmError>;

fn abort<E: Into<RealmError>>(err: E) -> ConflictableTransactionError<RealmError> {
    ConflictableTransactionError::Abort(err.into())
}

/// Take `cost` gold from a player inside a transaction and write the player
/// back. Aborts with `InsufficientGold` when the balance is short.
fn debit(
    players: &TransactionalTree,
    player_id: u64,
    player_key: &[u8],
    cost: i64,
) -> TxResult<PlayerRecord> {
    let raw = players
        .get(player_key)?
        .ok_or_else(|| abort(not_found::<PlayerRecord>(player_id)))?;
    let mut player: PlayerRecord = decode(&raw).map_err(abort)?;
    if player.gold < cost {
        return Err(abort(RealmError::InsufficientGold {
            needed: cost,
            available: player.gold,
        }));
    }
    player.gold -= cost;
    player.touch();
    players.insert(player_key, encode(&player).map_err(abort)?)?;
    Ok(player)
}

fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn pair_key(prefix: u64, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&prefix.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_id(raw: &[u8]) -> Result<u64, RealmError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| RealmError::Internal(format!("malformed id value ({} bytes)", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn username_key(username: &str) -> Vec<u8> {
    username.to_lowercase().into_bytes()
}

/// Signed coordinates shifted into unsigned space so byte order matches numeric
/// order and one row (fixed x) is a contiguous key range.
fn tile_key(x: i32, y: i32) -> Vec<u8> {
    let shift = |v: i32| (i64::from(v) + (1i64 << 31)) as u32;
    let mut key = Vec::with_capacity(8);
    key.extend_from_slice(&shift(x).to_be_bytes());
    key.extend_from_slice(&shift(y).to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RealmError> {
    Ok(bincode::serialize(value)?)
}

/// Record types kept in a tree. Versioned records refuse to decode across a
/// schema bump.
trait StoredRecord: Serialize + DeserializeOwned {
    const ENTITY: &'static str;

    fn check_schema(&self) -> Result<(), RealmError> {
        Ok(())
    }
}

fn schema_guard(entity: &'static str, expected: u8, found: u8) -> Result<(), RealmError> {
    if expected != found {
        return Err(RealmError::SchemaMismatch {
            entity,
            expected,
            found,
        });
    }
    Ok(())
}

impl StoredRecord for PlayerRecord {
    const ENTITY: &'static str = "player";
    fn check_schema(&self) -> Result<(), RealmError> {
        schema_guard(Self::ENTITY, PLAYER_SCHEMA_VERSION, self.schema_version)
    }
}

impl StoredRecord for ArmyRecord {
    const ENTITY: &'static str = "army";
    fn check_schema(&self) -> Result<(), RealmError> {
        schema_guard(Self::ENTITY, ARMY_SCHEMA_VERSION, self.schema_version)
    }
}

impl StoredRecord for MapTileRecord {
    const ENTITY: &'static str = "map tile";
    fn check_schema(&self) -> Result<(), RealmError> {
        schema_guard(Self::ENTITY, TILE_SCHEMA_VERSION, self.schema_version)
    }
}

macro_rules! plain_record {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(impl StoredRecord for $ty {
            const ENTITY: &'static str = $name;
        })*
    };
}

plain_record! {
    TerritoryRecord => "territory",
    CompanionRecord => "companion",
    CrusadeRecord => "crusade",
    PlayerQuestRecord => "player quest",
    SettlementRecord => "settlement",
    GameEventRecord => "event",
    FactionRecord => "faction",
    ItemRecord => "item",
    InventoryEntry => "inventory entry",
    WorldEventRecord => "world event",
    CombatEncounterRecord => "combat encounter",
    KingdomRecord => "kingdom",
    GuildRecord => "guild",
    ChatChannelRecord => "chat channel",
    ChatMessageRecord => "chat message",
    TradeOrderRecord => "trade order",
    BulletinQuestRecord => "bulletin quest",
}

fn decode<T: StoredRecord>(bytes: &[u8]) -> Result<T, RealmError> {
    let record: T = bincode::deserialize(bytes)?;
    record.check_schema()?;
    Ok(record)
}

fn not_found<T: StoredRecord>(id: impl std::fmt::Display) -> RealmError {
    RealmError::NotFound(format!("{}: {}", T::ENTITY, id))
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct RealmStoreBuilder {
    path: PathBuf,
    seed_reference_data: bool,
}

impl RealmStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed_reference_data: true,
        }
    }

    /// Skip inserting the built-in factions, items and chat channel.
    pub fn without_seed_data(mut self) -> Self {
        self.seed_reference_data = false;
        self
    }

    pub fn open(self) -> Result<RealmStore, RealmError> {
        RealmStore::open_with_options(self.path, self.seed_reference_data)
    }
}

/// Sled-backed persistence for every realm entity, one tree per entity.
///
/// Cloning is cheap: all clones share the same underlying database.
#[derive(Clone)]
pub struct RealmStore {
    db: sled::Db,
    players: sled::Tree,
    usernames: sled::Tree,
    credentials: sled::Tree,
    armies: sled::Tree,
    territories: sled::Tree,
    companions: sled::Tree,
    /// Player id -> number of companions, kept in step with `companions`.
    rosters: sled::Tree,
    crusades: sled::Tree,
    player_quests: sled::Tree,
    quest_claims: sled::Tree,
    tiles: sled::Tree,
    settlements: sled::Tree,
    events: sled::Tree,
    factions: sled::Tree,
    items: sled::Tree,
    inventory: sled::Tree,
    world_events: sled::Tree,
    combat: sled::Tree,
    kingdoms: sled::Tree,
    guilds: sled::Tree,
    chat_channels: sled::Tree,
    chat_messages: sled::Tree,
    trade_orders: sled::Tree,
    bulletins: sled::Tree,
}

impl RealmStore {
    /// Open (or create) the realm store rooted at `path`, seeding reference data
    /// (factions, items, the general chat channel) when it is missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RealmError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, seed: bool) -> Result<Self, RealmError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let store = Self {
            players: db.open_tree(TREE_PLAYERS)?,
            usernames: db.open_tree(TREE_USERNAMES)?,
            credentials: db.open_tree(TREE_CREDENTIALS)?,
            armies: db.open_tree(TREE_ARMIES)?,
            territories: db.open_tree(TREE_TERRITORIES)?,
            companions: db.open_tree(TREE_COMPANIONS)?,
            rosters: db.open_tree(TREE_ROSTERS)?,
            crusades: db.open_tree(TREE_CRUSADES)?,
            player_quests: db.open_tree(TREE_PLAYER_QUESTS)?,
            quest_claims: db.open_tree(TREE_QUEST_CLAIMS)?,
            tiles: db.open_tree(TREE_TILES)?,
            settlements: db.open_tree(TREE_SETTLEMENTS)?,
            events: db.open_tree(TREE_EVENTS)?,
            factions: db.open_tree(TREE_FACTIONS)?,
            items: db.open_tree(TREE_ITEMS)?,
            inventory: db.open_tree(TREE_INVENTORY)?,
            world_events: db.open_tree(TREE_WORLD_EVENTS)?,
            combat: db.open_tree(TREE_COMBAT)?,
            kingdoms: db.open_tree(TREE_KINGDOMS)?,
            guilds: db.open_tree(TREE_GUILDS)?,
            chat_channels: db.open_tree(TREE_CHAT_CHANNELS)?,
            chat_messages: db.open_tree(TREE_CHAT_MESSAGES)?,
            trade_orders: db.open_tree(TREE_TRADE_ORDERS)?,
            bulletins: db.open_tree(TREE_BULLETINS)?,
            db,
        };

        if seed {
            let inserted = store.seed_reference_data_if_needed()?;
            if inserted > 0 {
                info!("Seeded {} realm reference records", inserted);
            }
        }

        Ok(store)
    }

    fn next_id(&self) -> Result<u64, RealmError> {
        // generate_id starts at 0; ids handed to clients start at 1
        Ok(self.db.generate_id()? + 1)
    }

    fn flush(&self) -> Result<(), RealmError> {
        self.db.flush()?;
        Ok(())
    }

    fn put<T: StoredRecord>(&self, tree: &sled::Tree, key: &[u8], record: &T) -> Result<(), RealmError> {
        tree.insert(key, encode(record)?)?;
        self.flush()
    }

    fn fetch<T: StoredRecord>(tree: &sled::Tree, id: u64) -> Result<T, RealmError> {
        let Some(bytes) = tree.get(id_key(id))? else {
            return Err(not_found::<T>(id));
        };
        decode(&bytes)
    }

    fn scan<T: StoredRecord>(tree: &sled::Tree) -> Result<Vec<T>, RealmError> {
        tree.iter()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    fn scan_where<T, F>(tree: &sled::Tree, keep: F) -> Result<Vec<T>, RealmError>
    where
        T: StoredRecord,
        F: Fn(&T) -> bool,
    {
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            let record: T = decode(&value)?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Read-modify-write of one record inside a single-tree transaction.
    fn update_record<T, F>(&self, tree: &sled::Tree, id: u64, mutate: F) -> Result<T, RealmError>
    where
        T: StoredRecord,
        F: Fn(&mut T) -> Result<(), RealmError>,
    {
        let key = id_key(id);
        let updated = tree.transaction(|tx| -> TxResult<T> {
            let raw = tx.get(&key)?.ok_or_else(|| abort(not_found::<T>(id)))?;
            let mut record: T = decode(&raw).map_err(abort)?;
            mutate(&mut record).map_err(abort)?;
            tx.insert(key.as_slice(), encode(&record).map_err(abort)?)?;
            Ok(record)
        })?;
        self.flush()?;
        Ok(updated)
    }

    pub fn seed_reference_data_if_needed(&self) -> Result<usize, RealmError> {
        let mut inserted = 0usize;
        if self.factions.is_empty() {
            for faction in catalog::seed_factions()? {
                self.insert_faction(faction)?;
                inserted += 1;
            }
        }
        if self.items.is_empty() {
            for item in catalog::seed_items()? {
                self.insert_item(item)?;
                inserted += 1;
            }
        }
        if self.chat_channels.is_empty() {
            self.insert_chat_channel(ChatChannelRecord {
                id: 0,
                name: "General".to_string(),
                kind: "global".to_string(),
                description: Some("Realm-wide discussion".to_string()),
                is_active: true,
                created_at: Utc::now(),
            })?;
            inserted += 1;
        }
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Players and credentials
    // ------------------------------------------------------------------

    /// Insert a new player together with its password hash. The username is
    /// claimed case-insensitively; a taken name yields `Conflict` and nothing is written.
    pub fn create_player(
        &self,
        mut player: PlayerRecord,
        password_hash: &str,
    ) -> Result<PlayerRecord, RealmError> {
        player.id = self.next_id()?;
        player.schema_version = PLAYER_SCHEMA_VERSION;
        let name_key = username_key(&player.username);
        let key = id_key(player.id);
        let bytes = encode(&player)?;
        let username = player.username.clone();

        (&self.usernames, &self.players, &self.credentials).transaction(
            |(usernames, players, credentials)| -> TxResult<()> {
                if usernames.get(&name_key)?.is_some() {
                    return Err(abort(RealmError::Conflict(format!(
                        "username already taken: {}",
                        username
                    ))));
                }
                usernames.insert(name_key.as_slice(), key.as_slice())?;
                players.insert(key.as_slice(), bytes.as_slice())?;
                credentials.insert(key.as_slice(), password_hash.as_bytes())?;
                Ok(())
            },
        )?;
        self.flush()?;
        Ok(player)
    }

    pub fn get_player(&self, id: u64) -> Result<PlayerRecord, RealmError> {
        Self::fetch(&self.players, id)
    }

    pub fn find_player_by_username(&self, username: &str) -> Result<Option<PlayerRecord>, RealmError> {
        let Some(raw) = self.usernames.get(username_key(username))? else {
            return Ok(None);
        };
        let id = decode_id(&raw)?;
        self.get_player(id).map(Some)
    }

    /// Stored PHC password hash for a player.
    pub fn get_credential(&self, player_id: u64) -> Result<String, RealmError> {
        let Some(raw) = self.credentials.get(id_key(player_id))? else {
            return Err(RealmError::NotFound(format!("credential: {}", player_id)));
        };
        String::from_utf8(raw.to_vec())
            .map_err(|e| RealmError::Internal(format!("credential is not utf-8: {}", e)))
    }

    /// Insert or overwrite a player record as-is.
    pub fn put_player(&self, mut player: PlayerRecord) -> Result<(), RealmError> {
        player.schema_version = PLAYER_SCHEMA_VERSION;
        player.touch();
        self.put(&self.players, &id_key(player.id), &player)
    }

    /// Apply `mutate` to a player atomically. Errors returned by `mutate` abort
    /// the update and leave the stored record unchanged.
    pub fn update_player<F>(&self, id: u64, mutate: F) -> Result<PlayerRecord, RealmError>
    where
        F: Fn(&mut PlayerRecord) -> Result<(), RealmError>,
    {
        self.update_record(&self.players, id, |player: &mut PlayerRecord| {
            mutate(player)?;
            player.touch();
            Ok(())
        })
    }

    pub fn list_players(&self) -> Result<Vec<PlayerRecord>, RealmError> {
        Self::scan(&self.players)
    }

    pub fn count_players(&self) -> usize {
        self.players.len()
    }

    /// Deduct `cost` gold from a player and insert `build(&player)` into
    /// `target` in one transaction. Fails with `InsufficientGold` (writing
    /// nothing) when the balance is below `cost`.
    fn charge_and_insert<T, F>(
        &self,
        player_id: u64,
        cost: i64,
        target: &sled::Tree,
        record_id: u64,
        build: F,
    ) -> Result<(PlayerRecord, T), RealmError>
    where
        T: StoredRecord,
        F: Fn(&PlayerRecord) -> T,
    {
        if cost < 0 {
            return Err(RealmError::InvalidInput("cost cannot be negative".into()));
        }
        let player_key = id_key(player_id);
        let record_key = id_key(record_id);
        let result = (&self.players, target).transaction(|(players, target)| -> TxResult<(PlayerRecord, T)> {
            let player = debit(players, player_id, &player_key, cost)?;
            let record = build(&player);
            target.insert(record_key.as_slice(), encode(&record).map_err(abort)?)?;
            Ok((player, record))
        })?;
        self.flush()?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Armies
    // ------------------------------------------------------------------

    pub fn insert_army(&self, mut army: ArmyRecord) -> Result<ArmyRecord, RealmError> {
        army.id = self.next_id()?;
        army.schema_version = ARMY_SCHEMA_VERSION;
        self.put(&self.armies, &id_key(army.id), &army)?;
        Ok(army)
    }

    /// Pay for and raise an army at the player's current position.
    pub fn recruit_army(
        &self,
        player_id: u64,
        cost: i64,
        army: ArmyRecord,
    ) -> Result<(PlayerRecord, ArmyRecord), RealmError> {
        let id = self.next_id()?;
        self.charge_and_insert(player_id, cost, &self.armies, id, |player| {
            let mut raised = army.clone();
            raised.id = id;
            raised.player_id = player.id;
            raised.position_x = player.position_x;
            raised.position_y = player.position_y;
            raised.schema_version = ARMY_SCHEMA_VERSION;
            raised
        })
    }

    pub fn get_army(&self, id: u64) -> Result<ArmyRecord, RealmError> {
        Self::fetch(&self.armies, id)
    }

    pub fn armies_for_player(&self, player_id: u64) -> Result<Vec<ArmyRecord>, RealmError> {
        Self::scan_where(&self.armies, |army: &ArmyRecord| army.player_id == player_id)
    }

    /// Armies of any owner inside the square of half-width `radius` around `center`.
    pub fn armies_near(&self, center: Coord, radius: u32) -> Result<Vec<ArmyRecord>, RealmError> {
        Self::scan_where(&self.armies, |army: &ArmyRecord| {
            army.position_x.abs_diff(center.x) <= radius && army.position_y.abs_diff(center.y) <= radius
        })
    }

    pub fn update_army<F>(&self, id: u64, mutate: F) -> Result<ArmyRecord, RealmError>
    where
        F: Fn(&mut ArmyRecord) -> Result<(), RealmError>,
    {
        self.update_record(&self.armies, id, mutate)
    }

    pub fn delete_army(&self, id: u64) -> Result<ArmyRecord, RealmError> {
        let Some(raw) = self.armies.remove(id_key(id))? else {
            return Err(not_found::<ArmyRecord>(id));
        };
        self.flush()?;
        decode(&raw)
    }

    pub fn count_armies(&self) -> usize {
        self.armies.len()
    }

    // ------------------------------------------------------------------
    // Territories
    // ------------------------------------------------------------------

    pub fn insert_territory(&self, mut territory: TerritoryRecord) -> Result<TerritoryRecord, RealmError> {
        territory.id = self.next_id()?;
        self.put(&self.territories, &id_key(territory.id), &territory)?;
        Ok(territory)
    }

    pub fn get_territory(&self, id: u64) -> Result<TerritoryRecord, RealmError> {
        Self::fetch(&self.territories, id)
    }

    pub fn territories_for_player(&self, player_id: u64) -> Result<Vec<TerritoryRecord>, RealmError> {
        Self::scan_where(&self.territories, |t: &TerritoryRecord| t.player_id == player_id)
    }

    pub fn update_territory<F>(&self, id: u64, mutate: F) -> Result<TerritoryRecord, RealmError>
    where
        F: Fn(&mut TerritoryRecord) -> Result<(), RealmError>,
    {
        self.update_record(&self.territories, id, mutate)
    }

    /// Raise one building of a territory by a level, paying `cost_for(level)`
    /// gold from the owner. Charge and upgrade commit together or not at all.
    pub fn upgrade_building<F>(
        &self,
        territory_id: u64,
        building: &str,
        cost_for: F,
    ) -> Result<(PlayerRecord, TerritoryRecord, i64), RealmError>
    where
        F: Fn(u32) -> i64,
    {
        let territory_key = id_key(territory_id);
        let result = (&self.players, &self.territories).transaction(
            |(players, territories)| -> TxResult<(PlayerRecord, TerritoryRecord, i64)> {
                let raw = territories
                    .get(&territory_key)?
                    .ok_or_else(|| abort(not_found::<TerritoryRecord>(territory_id)))?;
                let mut territory: TerritoryRecord = decode(&raw).map_err(abort)?;
                let player_key = id_key(territory.player_id);
                let raw_player = players
                    .get(&player_key)?
                    .ok_or_else(|| abort(not_found::<PlayerRecord>(territory.player_id)))?;
                let mut player: PlayerRecord = decode(&raw_player).map_err(abort)?;

                let level = territory.building_level(building);
                let cost = cost_for(level);
                if player.gold < cost {
                    return Err(abort(RealmError::InsufficientGold {
                        needed: cost,
                        available: player.gold,
                    }));
                }
                player.gold -= cost;
                player.touch();
                territory.buildings.insert(building.to_string(), level + 1);

                players.insert(player_key.as_slice(), encode(&player).map_err(abort)?)?;
                territories.insert(territory_key.as_slice(), encode(&territory).map_err(abort)?)?;
                Ok((player, territory, cost))
            },
        )?;
        self.flush()?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Companions
    // ------------------------------------------------------------------

    pub fn insert_companion(&self, companion: CompanionRecord) -> Result<CompanionRecord, RealmError> {
        let (_, companion) = self.hire_companion(companion.player_id, 0, companion, usize::MAX)?;
        Ok(companion)
    }

    /// Pay for and add a companion to the player's roster. The roster count is
    /// read and bumped in the same transaction as the charge, so concurrent
    /// hires cannot exceed `max_roster`.
    pub fn hire_companion(
        &self,
        player_id: u64,
        cost: i64,
        companion: CompanionRecord,
        max_roster: usize,
    ) -> Result<(PlayerRecord, CompanionRecord), RealmError> {
        if cost < 0 {
            return Err(RealmError::InvalidInput("cost cannot be negative".into()));
        }
        // players and rosters share the key
        let player_key = id_key(player_id);
        // stores written before roster counts existed fall back to a scan
        let counted = match self.rosters.get(&player_key)? {
            Some(_) => 0,
            None => self.companions_for_player(player_id)?.len() as u64,
        };
        let mut hired = companion;
        hired.id = self.next_id()?;
        hired.player_id = player_id;
        let companion_key = id_key(hired.id);
        let companion_bytes = encode(&hired)?;

        let player = (&self.players, &self.companions, &self.rosters).transaction(
            |(players, companions, rosters)| -> TxResult<PlayerRecord> {
                let roster = match rosters.get(&player_key)? {
                    Some(raw) => decode_id(&raw).map_err(abort)?,
                    None => counted,
                };
                if roster >= max_roster as u64 {
                    return Err(abort(RealmError::InvalidInput(format!(
                        "companion roster is full ({} of {})",
                        roster, max_roster
                    ))));
                }
                let player = debit(players, player_id, &player_key, cost)?;
                companions.insert(companion_key.as_slice(), companion_bytes.as_slice())?;
                rosters.insert(player_key.as_slice(), id_key(roster + 1))?;
                Ok(player)
            },
        )?;
        self.flush()?;
        Ok((player, hired))
    }

    pub fn get_companion(&self, id: u64) -> Result<CompanionRecord, RealmError> {
        Self::fetch(&self.companions, id)
    }

    pub fn companions_for_player(&self, player_id: u64) -> Result<Vec<CompanionRecord>, RealmError> {
        Self::scan_where(&self.companions, |c: &CompanionRecord| c.player_id == player_id)
    }

    pub fn update_companion<F>(&self, id: u64, mutate: F) -> Result<CompanionRecord, RealmError>
    where
        F: Fn(&mut CompanionRecord) -> Result<(), RealmError>,
    {
        self.update_record(&self.companions, id, mutate)
    }

    // ------------------------------------------------------------------
    // Crusades
    // ------------------------------------------------------------------

    /// Record a crusade and mark its army as crusading in one transaction.
    pub fn start_crusade(&self, mut crusade: CrusadeRecord) -> Result<CrusadeRecord, RealmError> {
        crusade.id = self.next_id()?;
        let army_key = id_key(crusade.army_id);
        let crusade_key = id_key(crusade.id);
        let crusade_bytes = encode(&crusade)?;
        (&self.armies, &self.crusades).transaction(|(armies, crusades)| -> TxResult<()> {
            let raw = armies
                .get(&army_key)?
                .ok_or_else(|| abort(not_found::<ArmyRecord>(crusade.army_id)))?;
            let mut army: ArmyRecord = decode(&raw).map_err(abort)?;
            if army.player_id != crusade.player_id {
                return Err(abort(RealmError::InvalidInput(format!(
                    "army {} does not belong to player {}",
                    army.id, crusade.player_id
                ))));
            }
            if army.status == ArmyStatus::Crusading {
                return Err(abort(RealmError::Conflict(format!(
                    "army {} is already on crusade",
                    army.id
                ))));
            }
            army.status = ArmyStatus::Crusading;
            armies.insert(army_key.as_slice(), encode(&army).map_err(abort)?)?;
            crusades.insert(crusade_key.as_slice(), crusade_bytes.as_slice())?;
            Ok(())
        })?;
        self.flush()?;
        Ok(crusade)
    }

    pub fn crusades_for_player(&self, player_id: u64) -> Result<Vec<CrusadeRecord>, RealmError> {
        Self::scan_where(&self.crusades, |c: &CrusadeRecord| c.player_id == player_id)
    }

    // ------------------------------------------------------------------
    // Player quests
    // ------------------------------------------------------------------

    /// Insert an acceptance record. A second active acceptance of the same
    /// quest by the same player is a `Conflict`.
    pub fn accept_quest(&self, mut record: PlayerQuestRecord) -> Result<PlayerQuestRecord, RealmError> {
        record.id = self.next_id()?;
        let claim = pair_key(record.player_id, record.quest_id);
        let key = id_key(record.id);
        let bytes = encode(&record)?;
        (&self.player_quests, &self.quest_claims).transaction(|(quests, claims)| -> TxResult<()> {
            if claims.get(&claim)?.is_some() {
                return Err(abort(RealmError::Conflict(format!(
                    "quest {} already accepted by player {}",
                    record.quest_id, record.player_id
                ))));
            }
            claims.insert(claim.as_slice(), key.as_slice())?;
            quests.insert(key.as_slice(), bytes.as_slice())?;
            Ok(())
        })?;
        self.flush()?;
        Ok(record)
    }

    pub fn get_player_quest(&self, id: u64) -> Result<PlayerQuestRecord, RealmError> {
        Self::fetch(&self.player_quests, id)
    }

    pub fn player_quests_for(&self, player_id: u64) -> Result<Vec<PlayerQuestRecord>, RealmError> {
        Self::scan_where(&self.player_quests, |q: &PlayerQuestRecord| q.player_id == player_id)
    }

    /// Mutate a quest acceptance and its owner together. When the acceptance
    /// leaves the active state its duplicate-acceptance claim is released.
    pub fn apply_quest_progress<F>(
        &self,
        id: u64,
        mutate: F,
    ) -> Result<(PlayerQuestRecord, PlayerRecord), RealmError>
    where
        F: Fn(&mut PlayerQuestRecord, &mut PlayerRecord) -> Result<(), RealmError>,
    {
        let key = id_key(id);
        let result = (&self.player_quests, &self.quest_claims, &self.players).transaction(
            |(quests, claims, players)| -> TxResult<(PlayerQuestRecord, PlayerRecord)> {
                let raw = quests
                    .get(&key)?
                    .ok_or_else(|| abort(not_found::<PlayerQuestRecord>(id)))?;
                let mut record: PlayerQuestRecord = decode(&raw).map_err(abort)?;
                let player_key = id_key(record.player_id);
                let raw_player = players
                    .get(&player_key)?
                    .ok_or_else(|| abort(not_found::<PlayerRecord>(record.player_id)))?;
                let mut player: PlayerRecord = decode(&raw_player).map_err(abort)?;

                mutate(&mut record, &mut player).map_err(abort)?;
                player.touch();

                if !record.is_active() {
                    claims.remove(pair_key(record.player_id, record.quest_id))?;
                }
                quests.insert(key.as_slice(), encode(&record).map_err(abort)?)?;
                players.insert(player_key.as_slice(), encode(&player).map_err(abort)?)?;
                Ok((record, player))
            },
        )?;
        self.flush()?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Map tiles and settlements
    // ------------------------------------------------------------------

    pub fn get_tile(&self, at: Coord) -> Result<MapTileRecord, RealmError> {
        let Some(bytes) = self.tiles.get(tile_key(at.x, at.y))? else {
            return Err(not_found::<MapTileRecord>(format!("({}, {})", at.x, at.y)));
        };
        decode(&bytes)
    }

    /// Stored tiles inside the inclusive rectangle, row by row.
    pub fn tiles_in_rect(&self, min: Coord, max: Coord) -> Result<Vec<MapTileRecord>, RealmError> {
        let mut out = Vec::new();
        if min.x > max.x || min.y > max.y {
            return Ok(out);
        }
        for x in min.x..=max.x {
            for entry in self.tiles.range(tile_key(x, min.y)..=tile_key(x, max.y)) {
                let (_, value) = entry?;
                out.push(decode(&value)?);
            }
        }
        Ok(out)
    }

    /// Stored tiles in the square of half-width `radius` around `center`.
    pub fn tiles_around(&self, center: Coord, radius: u32) -> Result<Vec<MapTileRecord>, RealmError> {
        let r = radius as i32;
        self.tiles_in_rect(
            Coord::new(center.x.saturating_sub(r), center.y.saturating_sub(r)),
            Coord::new(center.x.saturating_add(r), center.y.saturating_add(r)),
        )
    }

    /// Persist a generated region. Each tile is inserted only if its coordinate
    /// is still empty, so existing world state is never overwritten. A tile and
    /// the settlement on it are written in one transaction. Returns the number
    /// of tiles inserted.
    pub fn store_region(&self, region: GeneratedRegion) -> Result<usize, RealmError> {
        let GeneratedRegion {
            tiles, settlements, ..
        } = region;
        let mut inserted = 0usize;
        for mut tile in tiles {
            let key = tile_key(tile.x, tile.y);
            if self.tiles.contains_key(&key)? {
                continue;
            }
            let settlement = match settlements.iter().find(|s| s.x == tile.x && s.y == tile.y) {
                Some(found) => {
                    let mut settlement = found.clone();
                    settlement.id = self.next_id()?;
                    tile.settlement_id = Some(settlement.id);
                    Some((id_key(settlement.id), encode(&settlement)?))
                }
                None => None,
            };
            tile.schema_version = TILE_SCHEMA_VERSION;
            let tile_bytes = encode(&tile)?;
            let written = (&self.tiles, &self.settlements).transaction(
                |(tiles, stored_settlements)| -> TxResult<bool> {
                    // another request may have generated this coordinate first
                    if tiles.get(&key)?.is_some() {
                        return Ok(false);
                    }
                    tiles.insert(key.as_slice(), tile_bytes.as_slice())?;
                    if let Some((settlement_key, bytes)) = &settlement {
                        stored_settlements.insert(settlement_key.as_slice(), bytes.as_slice())?;
                    }
                    Ok(true)
                },
            )?;
            if written {
                inserted += 1;
            }
        }
        self.flush()?;
        Ok(inserted)
    }

    /// Make sure every tile of the region around `origin` exists, generating
    /// the missing ones. Already generated regions are left untouched.
    pub fn ensure_region<R: Rng + ?Sized>(
        &self,
        origin: Coord,
        params: &MapParams,
        rng: &mut R,
    ) -> Result<usize, RealmError> {
        let side = (2 * params.radius as usize) + 1;
        let existing = self.tiles_around(origin, params.radius)?.len();
        if existing >= side * side {
            return Ok(0);
        }
        let region = generate_region(origin, params, rng);
        let inserted = self.store_region(region)?;
        if inserted > 0 {
            debug!(
                "Generated {} tiles around ({}, {})",
                inserted, origin.x, origin.y
            );
        }
        Ok(inserted)
    }

    /// Mark stored tiles within Manhattan distance `radius` of `center` explored.
    pub fn explore_around(&self, center: Coord, radius: u32) -> Result<usize, RealmError> {
        let r = radius as i32;
        let mut keys = Vec::new();
        for x in center.x.saturating_sub(r)..=center.x.saturating_add(r) {
            for y in center.y.saturating_sub(r)..=center.y.saturating_add(r) {
                if center.manhattan(Coord::new(x, y)) <= radius {
                    keys.push(tile_key(x, y));
                }
            }
        }
        let changed = self.tiles.transaction(|tx| -> TxResult<usize> {
            let mut changed = 0usize;
            for key in &keys {
                let Some(raw) = tx.get(key)? else {
                    continue;
                };
                let mut tile: MapTileRecord = decode(&raw).map_err(abort)?;
                if !tile.is_explored {
                    tile.is_explored = true;
                    tx.insert(key.as_slice(), encode(&tile).map_err(abort)?)?;
                    changed += 1;
                }
            }
            Ok(changed)
        })?;
        self.flush()?;
        Ok(changed)
    }

    /// Put a tile under a kingdom's control. A tile held by another kingdom is a `Conflict`.
    pub fn claim_tile(&self, kingdom_id: u64, at: Coord) -> Result<KingdomRecord, RealmError> {
        let tile_k = tile_key(at.x, at.y);
        let kingdom_k = id_key(kingdom_id);
        let kingdom = (&self.tiles, &self.kingdoms).transaction(|(tiles, kingdoms)| -> TxResult<KingdomRecord> {
            let raw_kingdom = kingdoms
                .get(&kingdom_k)?
                .ok_or_else(|| abort(not_found::<KingdomRecord>(kingdom_id)))?;
            let mut kingdom: KingdomRecord = decode(&raw_kingdom).map_err(abort)?;
            let raw_tile = tiles.get(&tile_k)?.ok_or_else(|| {
                abort(not_found::<MapTileRecord>(format!("({}, {})", at.x, at.y)))
            })?;
            let mut tile: MapTileRecord = decode(&raw_tile).map_err(abort)?;
            match tile.controlled_by {
                Some(owner) if owner == kingdom_id => return Ok(kingdom),
                Some(owner) => {
                    return Err(abort(RealmError::Conflict(format!(
                        "tile ({}, {}) is held by kingdom {}",
                        at.x, at.y, owner
                    ))))
                }
                None => {}
            }
            tile.controlled_by = Some(kingdom_id);
            kingdom.regions.push(at);
            tiles.insert(tile_k.as_slice(), encode(&tile).map_err(abort)?)?;
            kingdoms.insert(kingdom_k.as_slice(), encode(&kingdom).map_err(abort)?)?;
            Ok(kingdom)
        })?;
        self.flush()?;
        Ok(kingdom)
    }

    pub fn count_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn get_settlement(&self, id: u64) -> Result<SettlementRecord, RealmError> {
        Self::fetch(&self.settlements, id)
    }

    pub fn settlements_in_rect(&self, min: Coord, max: Coord) -> Result<Vec<SettlementRecord>, RealmError> {
        Self::scan_where(&self.settlements, |s: &SettlementRecord| {
            (min.x..=max.x).contains(&s.x) && (min.y..=max.y).contains(&s.y)
        })
    }

    // ------------------------------------------------------------------
    // Game events (keyed player id + event id, so a prefix scan is newest-last)
    // ------------------------------------------------------------------

    pub fn append_event(&self, mut event: GameEventRecord) -> Result<GameEventRecord, RealmError> {
        event.id = self.next_id()?;
        self.put(&self.events, &pair_key(event.player_id, event.id), &event)?;
        Ok(event)
    }

    /// Most recent events first.
    pub fn recent_events(&self, player_id: u64, limit: usize) -> Result<Vec<GameEventRecord>, RealmError> {
        self.events
            .scan_prefix(player_id.to_be_bytes())
            .rev()
            .take(limit)
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Factions, items and inventory
    // ------------------------------------------------------------------

    pub fn insert_faction(&self, mut faction: FactionRecord) -> Result<FactionRecord, RealmError> {
        faction.id = self.next_id()?;
        self.put(&self.factions, &id_key(faction.id), &faction)?;
        Ok(faction)
    }

    pub fn list_factions(&self) -> Result<Vec<FactionRecord>, RealmError> {
        Self::scan(&self.factions)
    }

    pub fn insert_item(&self, mut item: ItemRecord) -> Result<ItemRecord, RealmError> {
        item.id = self.next_id()?;
        self.put(&self.items, &id_key(item.id), &item)?;
        Ok(item)
    }

    pub fn get_item(&self, id: u64) -> Result<ItemRecord, RealmError> {
        Self::fetch(&self.items, id)
    }

    pub fn list_items(&self) -> Result<Vec<ItemRecord>, RealmError> {
        Self::scan(&self.items)
    }

    pub fn add_inventory_item(
        &self,
        player_id: u64,
        item_id: u64,
        quantity: u32,
    ) -> Result<InventoryEntry, RealmError> {
        let item = self.get_item(item_id)?;
        if quantity == 0 || (!item.is_stackable && quantity > 1) || quantity > item.max_stack.max(1) {
            return Err(RealmError::InvalidInput(format!(
                "cannot hold {} of {}",
                quantity, item.name
            )));
        }
        let entry = InventoryEntry {
            id: self.next_id()?,
            player_id,
            item_id,
            quantity,
            is_equipped: false,
            slot: None,
        };
        self.put(&self.inventory, &id_key(entry.id), &entry)?;
        Ok(entry)
    }

    /// Inventory entries joined with their item definitions.
    pub fn inventory_for(&self, player_id: u64) -> Result<Vec<InventoryItem>, RealmError> {
        let entries =
            Self::scan_where(&self.inventory, |e: &InventoryEntry| e.player_id == player_id)?;
        entries
            .into_iter()
            .map(|entry| {
                let item = self.get_item(entry.item_id)?;
                Ok(InventoryItem { entry, item })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // World events and combat
    // ------------------------------------------------------------------

    pub fn insert_world_event(&self, mut event: WorldEventRecord) -> Result<WorldEventRecord, RealmError> {
        event.id = self.next_id()?;
        self.put(&self.world_events, &id_key(event.id), &event)?;
        Ok(event)
    }

    pub fn active_world_events(&self, now: DateTime<Utc>) -> Result<Vec<WorldEventRecord>, RealmError> {
        Self::scan_where(&self.world_events, |e: &WorldEventRecord| {
            e.is_active && e.starts_at <= now && e.ends_at.map_or(true, |end| end > now)
        })
    }

    pub fn insert_combat(&self, mut encounter: CombatEncounterRecord) -> Result<CombatEncounterRecord, RealmError> {
        encounter.id = self.next_id()?;
        self.put(&self.combat, &id_key(encounter.id), &encounter)?;
        Ok(encounter)
    }

    /// The player's newest unresolved encounter, if any.
    pub fn active_combat(&self, player_id: u64) -> Result<Option<CombatEncounterRecord>, RealmError> {
        let active = Self::scan_where(&self.combat, |c: &CombatEncounterRecord| {
            c.player_id == player_id && c.status == CombatStatus::Active
        })?;
        Ok(active.into_iter().max_by_key(|c| c.id))
    }

    // ------------------------------------------------------------------
    // Kingdoms and guilds
    // ------------------------------------------------------------------

    pub fn insert_kingdom(&self, mut kingdom: KingdomRecord) -> Result<KingdomRecord, RealmError> {
        let taken = Self::scan_where(&self.kingdoms, |k: &KingdomRecord| {
            k.name.eq_ignore_ascii_case(&kingdom.name)
        })?;
        if !taken.is_empty() {
            return Err(RealmError::Conflict(format!(
                "kingdom name already taken: {}",
                kingdom.name
            )));
        }
        kingdom.id = self.next_id()?;
        self.put(&self.kingdoms, &id_key(kingdom.id), &kingdom)?;
        Ok(kingdom)
    }

    pub fn get_kingdom(&self, id: u64) -> Result<KingdomRecord, RealmError> {
        Self::fetch(&self.kingdoms, id)
    }

    pub fn list_kingdoms(&self) -> Result<Vec<KingdomRecord>, RealmError> {
        Self::scan(&self.kingdoms)
    }

    pub fn insert_guild(&self, mut guild: GuildRecord) -> Result<GuildRecord, RealmError> {
        guild.id = self.next_id()?;
        self.put(&self.guilds, &id_key(guild.id), &guild)?;
        Ok(guild)
    }

    pub fn list_guilds(&self) -> Result<Vec<GuildRecord>, RealmError> {
        Self::scan(&self.guilds)
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub fn insert_chat_channel(&self, mut channel: ChatChannelRecord) -> Result<ChatChannelRecord, RealmError> {
        channel.id = self.next_id()?;
        self.put(&self.chat_channels, &id_key(channel.id), &channel)?;
        Ok(channel)
    }

    pub fn list_chat_channels(&self) -> Result<Vec<ChatChannelRecord>, RealmError> {
        Self::scan_where(&self.chat_channels, |c: &ChatChannelRecord| c.is_active)
    }

    pub fn post_chat_message(&self, mut message: ChatMessageRecord) -> Result<ChatMessageRecord, RealmError> {
        let channel: ChatChannelRecord = Self::fetch(&self.chat_channels, message.channel_id)?;
        if !channel.is_active {
            return Err(RealmError::InvalidInput(format!(
                "chat channel {} is closed",
                channel.name
            )));
        }
        message.id = self.next_id()?;
        self.put(
            &self.chat_messages,
            &pair_key(message.channel_id, message.id),
            &message,
        )?;
        Ok(message)
    }

    /// Latest `limit` messages of a channel, oldest first.
    pub fn channel_messages(&self, channel_id: u64, limit: usize) -> Result<Vec<ChatMessageRecord>, RealmError> {
        let _: ChatChannelRecord = Self::fetch(&self.chat_channels, channel_id)?;
        let mut messages = self
            .chat_messages
            .scan_prefix(channel_id.to_be_bytes())
            .rev()
            .take(limit)
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect::<Result<Vec<ChatMessageRecord>, RealmError>>()?;
        messages.reverse();
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Trade orders and bulletin quests
    // ------------------------------------------------------------------

    pub fn insert_trade_order(&self, mut order: TradeOrderRecord) -> Result<TradeOrderRecord, RealmError> {
        order.id = self.next_id()?;
        self.put(&self.trade_orders, &id_key(order.id), &order)?;
        Ok(order)
    }

    pub fn trade_orders(&self, location: Option<&str>) -> Result<Vec<TradeOrderRecord>, RealmError> {
        Self::scan_where(&self.trade_orders, |o: &TradeOrderRecord| {
            location.map_or(true, |loc| o.location.eq_ignore_ascii_case(loc))
        })
    }

    pub fn insert_bulletin_quest(&self, mut quest: BulletinQuestRecord) -> Result<BulletinQuestRecord, RealmError> {
        quest.id = self.next_id()?;
        self.put(&self.bulletins, &id_key(quest.id), &quest)?;
        Ok(quest)
    }

    pub fn bulletin_quests(&self, location: Option<&str>) -> Result<Vec<BulletinQuestRecord>, RealmError> {
        Self::scan_where(&self.bulletins, |q: &BulletinQuestRecord| {
            location.map_or(true, |loc| q.board_location.eq_ignore_ascii_case(loc))
        })
    }

    /// Take an open bulletin quest. Authors cannot take their own postings.
    pub fn accept_bulletin_quest(&self, id: u64, player_id: u64) -> Result<BulletinQuestRecord, RealmError> {
        self.update_record(&self.bulletins, id, |quest: &mut BulletinQuestRecord| {
            if quest.author_id == player_id {
                return Err(RealmError::InvalidInput(
                    "cannot accept your own bulletin quest".into(),
                ));
            }
            if quest.status != BulletinStatus::Open {
                return Err(RealmError::Conflict(format!(
                    "bulletin quest {} is no longer open",
                    quest.id
                )));
            }
            quest.status = BulletinStatus::Accepted;
            quest.accepted_by = Some(player_id);
            quest.accepted_at = Some(Utc::now());
            Ok(())
        })
    }
}

#[cfg(test)]
impl RealmStore {
    /// Write raw bytes into the army tree, bypassing encoding.
    pub(crate) fn put_raw_army(&self, id: u64, bytes: &[u8]) -> Result<(), RealmError> {
        self.armies.insert(id_key(id), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::types::TroopCounts;
    use tempfile::TempDir;

    fn army(player_id: u64, x: i32, y: i32) -> ArmyRecord {
        ArmyRecord {
            id: 0,
            player_id,
            name: "Test Host".into(),
            description: String::new(),
            territory_id: None,
            position_x: x,
            position_y: y,
            movement: None,
            troops: TroopCounts::new(1, 0, 0, 0),
            total_strength: 10,
            upkeep_cost: 2,
            morale: 100,
            status: ArmyStatus::Idle,
            created_at: Utc::now(),
            schema_version: 0,
        }
    }

    #[test]
    fn tile_keys_sort_numerically() {
        assert!(tile_key(-1, 0) < tile_key(0, 0));
        assert!(tile_key(0, -5) < tile_key(0, 3));
        assert!(tile_key(i32::MIN, i32::MAX) < tile_key(i32::MAX, i32::MIN));
    }

    #[test]
    fn store_round_trip_player() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path()).open().expect("store");
        let mut player = PlayerRecord::new(0, "alice");
        player.gold = 42;
        let created = store.create_player(player, "$argon2id$stub").expect("create");
        let fetched = store.get_player(created.id).expect("get");
        assert_eq!(fetched.gold, 42);
        assert_eq!(fetched.schema_version, PLAYER_SCHEMA_VERSION);
        let by_name = store
            .find_player_by_username("ALICE")
            .expect("lookup")
            .expect("present");
        assert_eq!(by_name.id, created.id);
        assert_eq!(store.get_credential(created.id).unwrap(), "$argon2id$stub");
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        store
            .create_player(PlayerRecord::new(0, "bob"), "h1")
            .expect("first");
        let err = store
            .create_player(PlayerRecord::new(0, "Bob"), "h2")
            .unwrap_err();
        assert!(matches!(err, RealmError::Conflict(_)));
        assert_eq!(store.count_players(), 1);
    }

    #[test]
    fn missing_records_are_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        assert!(matches!(store.get_player(99), Err(RealmError::NotFound(_))));
        assert!(matches!(store.delete_army(99), Err(RealmError::NotFound(_))));
        assert!(store.armies_for_player(99).expect("scan").is_empty());
    }

    #[test]
    fn update_player_errors_leave_record_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let mut player = PlayerRecord::new(0, "carol");
        player.gold = 10;
        let player = store.create_player(player, "h").expect("create");
        let err = store
            .update_player(player.id, |p| {
                p.gold = 0;
                Err(RealmError::InvalidInput("nope".into()))
            })
            .unwrap_err();
        assert!(matches!(err, RealmError::InvalidInput(_)));
        assert_eq!(store.get_player(player.id).unwrap().gold, 10);
    }

    #[test]
    fn recruit_is_all_or_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let mut player = PlayerRecord::new(0, "dave");
        player.gold = 100;
        player.position_x = 3;
        let player = store.create_player(player, "h").expect("create");

        let err = store.recruit_army(player.id, 101, army(0, 0, 0)).unwrap_err();
        assert!(matches!(err, RealmError::InsufficientGold { needed: 101, available: 100 }));
        assert_eq!(store.get_player(player.id).unwrap().gold, 100);
        assert_eq!(store.count_armies(), 0);

        let (after, raised) = store.recruit_army(player.id, 60, army(0, 0, 0)).expect("recruit");
        assert_eq!(after.gold, 40);
        assert_eq!(raised.player_id, player.id);
        assert_eq!(raised.position_x, 3);
        assert_eq!(store.get_army(raised.id).unwrap().name, "Test Host");
    }

    #[test]
    fn building_upgrade_charges_by_level() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let mut player = PlayerRecord::new(0, "erin");
        player.gold = 1200;
        let player = store.create_player(player, "h").expect("create");
        let mut land = TerritoryRecord::new(player.id, "Keep", Default::default(), Coord::new(0, 0));
        land.buildings.insert("market".into(), 1);
        let land = store.insert_territory(land).unwrap();

        let (after, upgraded, cost) = store
            .upgrade_building(land.id, "market", |level| (i64::from(level) + 1) * 500)
            .expect("upgrade");
        assert_eq!(cost, 1000);
        assert_eq!(after.gold, 200);
        assert_eq!(upgraded.building_level("market"), 2);

        let err = store
            .upgrade_building(land.id, "market", |level| (i64::from(level) + 1) * 500)
            .unwrap_err();
        assert!(matches!(err, RealmError::InsufficientGold { needed: 1500, available: 200 }));
        assert_eq!(store.get_territory(land.id).unwrap().building_level("market"), 2);
    }

    #[test]
    fn nearby_armies_use_square_radius() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        store.insert_army(army(1, 8, 8)).unwrap();
        store.insert_army(army(2, 9, 5)).unwrap();
        store.insert_army(army(3, 5, 5)).unwrap();
        let near = store.armies_near(Coord::new(5, 5), 3).unwrap();
        let owners: Vec<u64> = near.iter().map(|a| a.player_id).collect();
        assert!(owners.contains(&1));
        assert!(owners.contains(&3));
        assert!(!owners.contains(&2));
    }

    #[test]
    fn events_come_back_newest_first() {
        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        for i in 0..5 {
            store
                .append_event(GameEventRecord::new(
                    7,
                    "test",
                    &format!("event {}", i),
                    "scroll",
                    Default::default(),
                ))
                .unwrap();
        }
        store
            .append_event(GameEventRecord::new(8, "test", "other", "scroll", Default::default()))
            .unwrap();
        let recent = store.recent_events(7, 3).unwrap();
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 4", "event 3", "event 2"]);
    }

    #[test]
    fn regions_are_generated_once() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let origin = Coord::new(5, 5);
        let params = MapParams::default();

        let inserted = store
            .ensure_region(origin, &params, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(inserted, 121);
        let first = store.tiles_around(origin, params.radius).unwrap();

        let again = store
            .ensure_region(origin, &params, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(again, 0);
        let regenerated = generate_region(origin, &params, &mut StdRng::seed_from_u64(3));
        assert_eq!(store.store_region(regenerated).unwrap(), 0);
        assert_eq!(store.tiles_around(origin, params.radius).unwrap(), first);
    }

    #[test]
    fn stored_tiles_point_at_stored_settlements() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let mut linked = 0;
        for seed in 0..10 {
            let origin = Coord::new(seed as i32 * 20, 0);
            store
                .ensure_region(origin, &MapParams::default(), &mut StdRng::seed_from_u64(seed))
                .unwrap();
            for tile in store.tiles_around(origin, 5).unwrap() {
                if let Some(id) = tile.settlement_id {
                    let settlement = store.get_settlement(id).expect("settlement for tile");
                    assert_eq!((settlement.x, settlement.y), (tile.x, tile.y));
                    linked += 1;
                }
            }
        }
        assert!(linked > 0);
    }

    #[test]
    fn concurrent_hires_respect_the_roster_cap() {
        use crate::realm::roster::{companion_class, new_companion};

        let dir = TempDir::new().expect("tempdir");
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("store");
        let mut player = PlayerRecord::new(0, "gwen");
        player.gold = 10_000;
        let player = store.create_player(player, "h").expect("create");
        let class = companion_class("knight").unwrap();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let store = store.clone();
                let companion = new_companion(player.id, class);
                std::thread::spawn(move || store.hire_companion(player.id, 100, companion, 4))
            })
            .collect();
        let hired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(hired, 4);
        assert_eq!(store.companions_for_player(player.id).unwrap().len(), 4);
        assert_eq!(store.get_player(player.id).unwrap().gold, 10_000 - 400);
        let err = store
            .hire_companion(player.id, 0, new_companion(player.id, class), 4)
            .unwrap_err();
        assert!(matches!(err, RealmError::InvalidInput(_)));
    }

    #[test]
    fn reference_data_is_seeded_once() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = RealmStoreBuilder::new(dir.path()).open().expect("store");
            assert_eq!(store.list_factions().unwrap().len(), 3);
            assert_eq!(store.list_items().unwrap().len(), 3);
            assert_eq!(store.list_chat_channels().unwrap().len(), 1);
        }
        let store = RealmStoreBuilder::new(dir.path())
            .without_seed_data()
            .open()
            .expect("reopen");
        assert_eq!(store.seed_reference_data_if_needed().unwrap(), 0);
        assert_eq!(store.list_factions().unwrap().len(), 3);
    }
}
