//! State snapshot and persistence gateway.
//!
//! All reads and writes of campaign, character, NPC, location, encounter,
//! and audit-log state go through [`GameStore`]. Mutations are narrow,
//! named operations; the append-only mechanics log records every mechanical
//! event and is never rewritten. [`GameStore::build_snapshot`] assembles the
//! consistent read-view a turn narrates from.

use crate::world::{
    CampaignId, CampaignState, CharacterId, CharacterState, Combatant, DeathSaves, EncounterId,
    EncounterState, GameMode, HiddenObject, Location, LocationId, MechanicsLogEntry, Npc, NpcId,
    Snapshot, SpellSlots, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// How many audit entries a snapshot carries.
const SNAPSHOT_LOG_ENTRIES: usize = 10;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// Errors from gateway operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("NPC not found: {0}")]
    NpcNotFound(NpcId),

    #[error("Location not found: {0}")]
    LocationNotFound(LocationId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// In-memory world state for every campaign, plus the audit log.
#[derive(Debug, Default)]
pub struct GameStore {
    campaigns: HashMap<CampaignId, CampaignState>,
    characters: HashMap<CharacterId, CharacterState>,
    npcs: HashMap<NpcId, Npc>,
    locations: HashMap<LocationId, Location>,
    encounters: HashMap<EncounterId, EncounterState>,
    log: HashMap<CampaignId, Vec<MechanicsLogEntry>>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    /// Fetch campaign state, creating it lazily on first touch.
    pub fn ensure_campaign(
        &mut self,
        id: CampaignId,
        owner: UserId,
        name: &str,
    ) -> &mut CampaignState {
        self.campaigns
            .entry(id)
            .or_insert_with(|| CampaignState::new(id, owner, name))
    }

    pub fn campaign(&self, id: CampaignId) -> Result<&CampaignState, StoreError> {
        self.campaigns
            .get(&id)
            .ok_or(StoreError::CampaignNotFound(id))
    }

    fn campaign_mut(&mut self, id: CampaignId) -> Result<&mut CampaignState, StoreError> {
        self.campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))
    }

    /// Advance the campaign's monotonic turn counter; returns the new value.
    pub fn advance_turn(&mut self, id: CampaignId) -> Result<u64, StoreError> {
        let campaign = self.campaign_mut(id)?;
        campaign.turn_number += 1;
        Ok(campaign.turn_number)
    }

    pub fn set_mode(&mut self, id: CampaignId, mode: GameMode) -> Result<(), StoreError> {
        self.campaign_mut(id)?.mode = mode;
        Ok(())
    }

    pub fn set_in_game_time(
        &mut self,
        id: CampaignId,
        label: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.campaign_mut(id)?.in_game_time = label.into();
        Ok(())
    }

    /// Move the party to a location and mark it visited.
    pub fn set_location(
        &mut self,
        campaign_id: CampaignId,
        location_id: LocationId,
    ) -> Result<(), StoreError> {
        let location = self
            .locations
            .get_mut(&location_id)
            .ok_or(StoreError::LocationNotFound(location_id))?;
        location.visited = true;
        self.campaign_mut(campaign_id)?.current_location = Some(location_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    pub fn upsert_character(&mut self, character: CharacterState) {
        self.characters.insert(character.id, character);
    }

    pub fn character(&self, id: CharacterId) -> Result<&CharacterState, StoreError> {
        self.characters
            .get(&id)
            .ok_or(StoreError::CharacterNotFound(id))
    }

    /// Campaign-scoped party listing, in stable insertion-independent order
    /// (sorted by name so snapshots are deterministic).
    pub fn party(&self, campaign_id: CampaignId) -> Vec<CharacterState> {
        let mut party: Vec<CharacterState> = self
            .characters
            .values()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect();
        party.sort_by(|a, b| a.name.cmp(&b.name));
        party
    }

    pub fn find_character_by_name(
        &self,
        campaign_id: CampaignId,
        name: &str,
    ) -> Option<&CharacterState> {
        self.characters
            .values()
            .find(|c| c.campaign_id == campaign_id && c.name.eq_ignore_ascii_case(name))
    }

    /// Write back a resolved HP value. The resolver already clamped it.
    pub fn apply_hp(&mut self, id: CharacterId, new_hp: i32) -> Result<(), StoreError> {
        let character = self
            .characters
            .get_mut(&id)
            .ok_or(StoreError::CharacterNotFound(id))?;
        character.hp.current = new_hp.clamp(0, character.hp.maximum);
        Ok(())
    }

    /// Write back a spell-slot table after a successful leveled cast.
    pub fn apply_spell_slots(
        &mut self,
        id: CharacterId,
        slots: SpellSlots,
    ) -> Result<(), StoreError> {
        self.characters
            .get_mut(&id)
            .ok_or(StoreError::CharacterNotFound(id))?
            .spell_slots = slots;
        Ok(())
    }

    /// Write back death-save counters.
    pub fn apply_death_saves(
        &mut self,
        id: CharacterId,
        saves: DeathSaves,
    ) -> Result<(), StoreError> {
        self.characters
            .get_mut(&id)
            .ok_or(StoreError::CharacterNotFound(id))?
            .death_saves = saves;
        Ok(())
    }

    // ------------------------------------------------------------------
    // NPCs
    // ------------------------------------------------------------------

    pub fn upsert_npc(&mut self, npc: Npc) {
        self.npcs.insert(npc.id, npc);
    }

    pub fn npc(&self, id: NpcId) -> Result<&Npc, StoreError> {
        self.npcs.get(&id).ok_or(StoreError::NpcNotFound(id))
    }

    pub fn find_npc_by_name(&self, campaign_id: CampaignId, name: &str) -> Option<&Npc> {
        self.npcs
            .values()
            .find(|n| n.campaign_id == campaign_id && n.name.eq_ignore_ascii_case(name))
    }

    /// Active NPCs in a campaign, sorted by name.
    pub fn active_npcs(&self, campaign_id: CampaignId) -> Vec<Npc> {
        let mut npcs: Vec<Npc> = self
            .npcs
            .values()
            .filter(|n| n.campaign_id == campaign_id && n.active)
            .cloned()
            .collect();
        npcs.sort_by(|a, b| a.name.cmp(&b.name));
        npcs
    }

    /// Active NPCs present at a location.
    pub fn npcs_at(&self, campaign_id: CampaignId, location: LocationId) -> Vec<Npc> {
        self.active_npcs(campaign_id)
            .into_iter()
            .filter(|n| n.location == Some(location))
            .collect()
    }

    /// Write back goal progress from a drift tick. Progress never
    /// decreases; a stale lower value is ignored.
    pub fn advance_npc_goal(&mut self, id: NpcId, progress: u8) -> Result<u8, StoreError> {
        let npc = self.npcs.get_mut(&id).ok_or(StoreError::NpcNotFound(id))?;
        if progress > npc.goal_progress {
            npc.goal_progress = progress.min(100);
        }
        Ok(npc.goal_progress)
    }

    /// Replace an NPC's goal. A new goal starts from zero progress.
    pub fn set_npc_goal(&mut self, id: NpcId, goal: impl Into<String>) -> Result<(), StoreError> {
        let npc = self.npcs.get_mut(&id).ok_or(StoreError::NpcNotFound(id))?;
        npc.goal = goal.into();
        npc.goal_progress = 0;
        Ok(())
    }

    pub fn adjust_npc_disposition(&mut self, id: NpcId, delta: i32) -> Result<i32, StoreError> {
        let npc = self.npcs.get_mut(&id).ok_or(StoreError::NpcNotFound(id))?;
        Ok(npc.adjust_disposition(delta))
    }

    // ------------------------------------------------------------------
    // Locations
    // ------------------------------------------------------------------

    pub fn upsert_location(&mut self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn location(&self, id: LocationId) -> Result<&Location, StoreError> {
        self.locations
            .get(&id)
            .ok_or(StoreError::LocationNotFound(id))
    }

    pub fn find_location_by_name(&self, campaign_id: CampaignId, name: &str) -> Option<&Location> {
        self.locations
            .values()
            .find(|l| l.campaign_id == campaign_id && l.name.eq_ignore_ascii_case(name))
    }

    /// Mark a hidden object discovered. The transition is one-way; returns
    /// the discovered object only when this call flipped it.
    pub fn mark_hidden_object_discovered(
        &mut self,
        location_id: LocationId,
        object_name: &str,
    ) -> Result<Option<HiddenObject>, StoreError> {
        let location = self
            .locations
            .get_mut(&location_id)
            .ok_or(StoreError::LocationNotFound(location_id))?;
        for object in &mut location.hidden_objects {
            if object.name == object_name && !object.discovered {
                object.discovered = true;
                return Ok(Some(object.clone()));
            }
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Encounters
    // ------------------------------------------------------------------

    pub fn active_encounter(&self, campaign_id: CampaignId) -> Option<&EncounterState> {
        self.encounters
            .values()
            .find(|e| e.campaign_id == campaign_id && e.active)
    }

    /// Start a new encounter. Any prior active encounter for the campaign
    /// is deactivated first; there is at most one.
    pub fn start_encounter(
        &mut self,
        campaign_id: CampaignId,
        combatants: Vec<Combatant>,
    ) -> Result<EncounterId, StoreError> {
        for encounter in self.encounters.values_mut() {
            if encounter.campaign_id == campaign_id {
                encounter.active = false;
            }
        }
        let encounter = EncounterState {
            id: EncounterId::new(),
            campaign_id,
            active: true,
            round: 1,
            turn_index: 0,
            combatants,
        };
        let id = encounter.id;
        self.encounters.insert(id, encounter);
        self.campaign_mut(campaign_id)?.mode = GameMode::Combat;
        Ok(id)
    }

    pub fn end_encounter(&mut self, campaign_id: CampaignId) -> Result<(), StoreError> {
        for encounter in self.encounters.values_mut() {
            if encounter.campaign_id == campaign_id {
                encounter.active = false;
            }
        }
        self.campaign_mut(campaign_id)?.mode = GameMode::Exploration;
        Ok(())
    }

    /// Sync a combatant's HP inside the active encounter, if any.
    pub fn update_encounter_hp(&mut self, campaign_id: CampaignId, name: &str, new_hp: i32) {
        if let Some(encounter) = self
            .encounters
            .values_mut()
            .find(|e| e.campaign_id == campaign_id && e.active)
        {
            if let Some(combatant) = encounter
                .combatants
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(name))
            {
                combatant.hp = new_hp.clamp(0, combatant.max_hp);
            }
        }
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    /// Append to the mechanics audit log. Entries are immutable once
    /// written.
    pub fn append_log(&mut self, entry: MechanicsLogEntry) {
        self.log.entry(entry.campaign_id).or_default().push(entry);
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent_log(&self, campaign_id: CampaignId, limit: usize) -> Vec<MechanicsLogEntry> {
        self.log
            .get(&campaign_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn log_len(&self, campaign_id: CampaignId) -> usize {
        self.log.get(&campaign_id).map_or(0, |entries| entries.len())
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Assemble the consistent read-view for a turn: campaign state, the
    /// party, the current location and NPCs present, the active encounter,
    /// the ten most recent audit entries, and any newly discovered hidden
    /// objects.
    pub fn build_snapshot(
        &self,
        campaign_id: CampaignId,
        new_discoveries: Vec<HiddenObject>,
    ) -> Result<Snapshot, StoreError> {
        let campaign = self.campaign(campaign_id)?.clone();
        let party = self.party(campaign_id);
        let location = match campaign.current_location {
            Some(id) => Some(self.location(id)?.clone()),
            None => None,
        };
        let npcs_present = match campaign.current_location {
            Some(id) => self.npcs_at(campaign_id, id),
            None => Vec::new(),
        };
        let encounter = self.active_encounter(campaign_id).cloned();
        let recent_log = self.recent_log(campaign_id, SNAPSHOT_LOG_ENTRIES);

        Ok(Snapshot {
            campaign,
            party,
            location,
            npcs_present,
            encounter,
            recent_log,
            new_discoveries,
        })
    }

    // ------------------------------------------------------------------
    // Save / load
    // ------------------------------------------------------------------

    /// Serialize one campaign's full state to a JSON file.
    pub async fn save_campaign_json(
        &self,
        campaign_id: CampaignId,
        path: impl AsRef<Path>,
    ) -> Result<(), StoreError> {
        let saved = SavedCampaign {
            version: SAVE_VERSION,
            campaign: self.campaign(campaign_id)?.clone(),
            characters: self.party(campaign_id),
            npcs: self
                .npcs
                .values()
                .filter(|n| n.campaign_id == campaign_id)
                .cloned()
                .collect(),
            locations: self
                .locations
                .values()
                .filter(|l| l.campaign_id == campaign_id)
                .cloned()
                .collect(),
            encounters: self
                .encounters
                .values()
                .filter(|e| e.campaign_id == campaign_id)
                .cloned()
                .collect(),
            log: self.log.get(&campaign_id).cloned().unwrap_or_default(),
        };
        let content = serde_json::to_string_pretty(&saved)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load a saved campaign into the store, replacing any state already
    /// held for that campaign id.
    pub async fn load_campaign_json(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<CampaignId, StoreError> {
        let content = fs::read_to_string(path).await?;
        let saved: SavedCampaign = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        let campaign_id = saved.campaign.id;
        self.campaigns.insert(campaign_id, saved.campaign);
        for character in saved.characters {
            self.characters.insert(character.id, character);
        }
        for npc in saved.npcs {
            self.npcs.insert(npc.id, npc);
        }
        for location in saved.locations {
            self.locations.insert(location.id, location);
        }
        for encounter in saved.encounters {
            self.encounters.insert(encounter.id, encounter);
        }
        self.log.insert(campaign_id, saved.log);

        Ok(campaign_id)
    }
}

/// Versioned on-disk envelope for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCampaign {
    pub version: u32,
    pub campaign: CampaignState,
    pub characters: Vec<CharacterState>,
    pub npcs: Vec<Npc>,
    pub locations: Vec<Location>,
    pub encounters: Vec<EncounterState>,
    pub log: Vec<MechanicsLogEntry>,
}
