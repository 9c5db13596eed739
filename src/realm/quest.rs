/// Quest lifecycle: which catalog quests a player may take, accepting them,
/// advancing objectives and paying out rewards on completion.
///
/// Quest definitions come from the read-only [`QuestCatalog`]; only the
/// per-player acceptance records live in the store.
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::logutil::escape_log;
use crate::realm::catalog::QuestCatalog;
use crate::realm::errors::RealmError;
use crate::realm::storage::RealmStore;
use crate::realm::types::{
    ArmyStatus, CampaignStatus, GameEventRecord, Importance, PlayerQuestRecord, PlayerRecord,
    QuestDefinition,
};

/// Experience needed per level.
pub const XP_PER_LEVEL: i64 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptQuestRequest {
    pub player_id: u64,
    pub quest_id: u64,
    #[serde(default)]
    pub army_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub quest: PlayerQuestRecord,
    pub player: PlayerRecord,
    pub completed: bool,
    /// Names of reward items actually added to the inventory.
    pub items_granted: Vec<String>,
}

fn has_completed(records: &[PlayerQuestRecord], quest_id: u64) -> bool {
    records
        .iter()
        .any(|r| r.quest_id == quest_id && r.status == CampaignStatus::Completed)
}

/// Level implied by an experience total, never below 1.
pub fn level_for_experience(experience: i64) -> u32 {
    let level = 1 + experience.max(0) / XP_PER_LEVEL;
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Check whether `quest` is open to `player` given its acceptance history.
fn check_eligible(
    catalog: &QuestCatalog,
    quest: &QuestDefinition,
    player: &PlayerRecord,
    records: &[PlayerQuestRecord],
) -> Result<(), RealmError> {
    if !quest.is_active {
        return Err(RealmError::InvalidInput(format!(
            "quest {} is not currently offered",
            quest.id
        )));
    }
    if player.level < quest.required_level {
        return Err(RealmError::InvalidInput(format!(
            "quest {} requires level {}",
            quest.id, quest.required_level
        )));
    }
    if records.iter().any(|r| r.quest_id == quest.id && r.is_active()) {
        return Err(RealmError::Conflict(format!(
            "quest {} already accepted",
            quest.id
        )));
    }
    if has_completed(records, quest.id) {
        return Err(RealmError::Conflict(format!(
            "quest {} already completed",
            quest.id
        )));
    }
    if let Some(previous) = catalog.predecessor_of(quest.id) {
        if !has_completed(records, previous.id) {
            return Err(RealmError::InvalidInput(format!(
                "complete '{}' first",
                previous.name
            )));
        }
    }
    Ok(())
}

/// Catalog quests the player could accept right now.
pub fn available_quests(
    catalog: &QuestCatalog,
    player: &PlayerRecord,
    records: &[PlayerQuestRecord],
) -> Vec<QuestDefinition> {
    catalog
        .all()
        .iter()
        .filter(|quest| check_eligible(catalog, quest, player, records).is_ok())
        .cloned()
        .collect()
}

/// Accept a catalog quest. Quests that need troops must name an idle army
/// owned by the player with enough strength.
pub fn accept_quest(
    store: &RealmStore,
    catalog: &QuestCatalog,
    request: &AcceptQuestRequest,
) -> Result<PlayerQuestRecord, RealmError> {
    let quest = catalog
        .get(request.quest_id)
        .ok_or_else(|| RealmError::NotFound(format!("quest: {}", request.quest_id)))?;
    let player = store.get_player(request.player_id)?;
    let records = store.player_quests_for(player.id)?;
    check_eligible(catalog, quest, &player, &records)?;

    if quest.required_troops > 0 {
        let army_id = request.army_id.ok_or_else(|| {
            RealmError::InvalidInput(format!(
                "quest {} needs an army of strength {}",
                quest.id, quest.required_troops
            ))
        })?;
        let army = store.get_army(army_id)?;
        if army.player_id != player.id {
            return Err(RealmError::InvalidInput(format!(
                "army {} does not belong to player {}",
                army.id, player.id
            )));
        }
        if army.status != ArmyStatus::Idle {
            return Err(RealmError::InvalidInput(format!("army {} is not idle", army.id)));
        }
        if army.total_strength < quest.required_troops {
            return Err(RealmError::InvalidInput(format!(
                "army {} has strength {}, quest needs {}",
                army.id, army.total_strength, quest.required_troops
            )));
        }
    }

    let record = store.accept_quest(PlayerQuestRecord {
        id: 0,
        player_id: player.id,
        quest_id: quest.id,
        army_id: request.army_id,
        status: CampaignStatus::Active,
        current_objective: 0,
        start_time: Utc::now(),
        end_time: None,
    })?;

    store.append_event(GameEventRecord::new(
        player.id,
        "quest_accepted",
        &format!("You accepted the quest '{}' from {}.", quest.name, quest.quest_giver_name),
        "scroll",
        Importance::Normal,
    ))?;
    debug!(
        "Player {} accepted quest {}",
        escape_log(&player.username),
        quest.id
    );
    Ok(record)
}

fn grant_rewards(quest: &QuestDefinition, player: &mut PlayerRecord) {
    player.gold += quest.gold_reward;
    player.experience += quest.experience_reward;
    player.honor += quest.honor_reward;
    for (faction, change) in &quest.faction_reputation_changes {
        *player.faction_reputations.entry(faction.clone()).or_insert(0) += change;
    }
    player.level = player.level.max(level_for_experience(player.experience));
}

/// Complete the current objective. Finishing the last one completes the quest
/// and pays gold, experience, honor and reputation in the same transaction;
/// reward items follow once it has committed.
pub fn advance_quest(
    store: &RealmStore,
    catalog: &QuestCatalog,
    player_quest_id: u64,
) -> Result<QuestProgress, RealmError> {
    let current = store.get_player_quest(player_quest_id)?;
    let quest = catalog
        .get(current.quest_id)
        .ok_or_else(|| RealmError::NotFound(format!("quest: {}", current.quest_id)))?;
    let objectives = quest.objectives.len().max(1) as u32;

    let (record, player) = store.apply_quest_progress(player_quest_id, |record, player| {
        if !record.is_active() {
            return Err(RealmError::Conflict(format!(
                "quest {} is no longer active",
                record.quest_id
            )));
        }
        record.current_objective += 1;
        if record.current_objective >= objectives {
            record.current_objective = objectives;
            record.status = CampaignStatus::Completed;
            record.end_time = Some(Utc::now());
            grant_rewards(quest, player);
        }
        Ok(())
    })?;

    let completed = record.status == CampaignStatus::Completed;
    let mut items_granted = Vec::new();
    if completed {
        items_granted = grant_items(store, player.id, &quest.item_rewards)?;
        store.append_event(GameEventRecord::new(
            player.id,
            "quest_completed",
            &format!(
                "Quest '{}' completed! You earned {} gold and {} experience.",
                quest.name, quest.gold_reward, quest.experience_reward
            ),
            "trophy",
            Importance::High,
        ))?;
    }

    Ok(QuestProgress {
        quest: record,
        player,
        completed,
        items_granted,
    })
}

/// Reward items are matched by name; names missing from the item table are
/// skipped with a warning rather than failing an already committed completion.
fn grant_items(store: &RealmStore, player_id: u64, names: &[String]) -> Result<Vec<String>, RealmError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let items = store.list_items()?;
    let mut granted = Vec::new();
    for name in names {
        match items.iter().find(|i| i.name.eq_ignore_ascii_case(name)) {
            Some(item) => {
                store.add_inventory_item(player_id, item.id, 1)?;
                granted.push(item.name.clone());
            }
            None => warn!("Quest reward item '{}' is not in the item table", escape_log(name)),
        }
    }
    Ok(granted)
}

pub fn abandon_quest(store: &RealmStore, player_quest_id: u64) -> Result<PlayerQuestRecord, RealmError> {
    let (record, _) = store.apply_quest_progress(player_quest_id, |record, _| {
        if !record.is_active() {
            return Err(RealmError::Conflict(format!(
                "quest {} is no longer active",
                record.quest_id
            )));
        }
        record.status = CampaignStatus::Failed;
        record.end_time = Some(Utc::now());
        Ok(())
    })?;
    Ok(record)
}
