//! Persisted game-world data model.
//!
//! Everything here is owned by the persistence gateway and read by the turn
//! engine through snapshots. The types are deliberately explicit: skills,
//! equipment, initiative order, and hidden-object lists are typed structures
//! validated on read/write, never opaque blobs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Ids
// ============================================================================

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UserId);
id_type!(CampaignId);
id_type!(CharacterId);
id_type!(NpcId);
id_type!(LocationId);
id_type!(EncounterId);

// ============================================================================
// Abilities and skills
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }

    pub fn from_name(name: &str) -> Option<Ability> {
        match name.to_lowercase().as_str() {
            "strength" | "str" => Some(Ability::Strength),
            "dexterity" | "dex" => Some(Ability::Dexterity),
            "constitution" | "con" => Some(Ability::Constitution),
            "intelligence" | "int" => Some(Ability::Intelligence),
            "wisdom" | "wis" => Some(Ability::Wisdom),
            "charisma" | "cha" => Some(Ability::Charisma),
            _ => None,
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ability score container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// Derived modifier: floor((score - 10) / 2), correct for scores below 10.
    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// Skills, each keyed to an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Athletics => "athletics",
            Skill::Acrobatics => "acrobatics",
            Skill::SleightOfHand => "sleight_of_hand",
            Skill::Stealth => "stealth",
            Skill::Arcana => "arcana",
            Skill::History => "history",
            Skill::Investigation => "investigation",
            Skill::Nature => "nature",
            Skill::Religion => "religion",
            Skill::AnimalHandling => "animal_handling",
            Skill::Insight => "insight",
            Skill::Medicine => "medicine",
            Skill::Perception => "perception",
            Skill::Survival => "survival",
            Skill::Deception => "deception",
            Skill::Intimidation => "intimidation",
            Skill::Performance => "performance",
            Skill::Persuasion => "persuasion",
        }
    }

    pub fn from_name(name: &str) -> Option<Skill> {
        let all = [
            Skill::Athletics,
            Skill::Acrobatics,
            Skill::SleightOfHand,
            Skill::Stealth,
            Skill::Arcana,
            Skill::History,
            Skill::Investigation,
            Skill::Nature,
            Skill::Religion,
            Skill::AnimalHandling,
            Skill::Insight,
            Skill::Medicine,
            Skill::Perception,
            Skill::Survival,
            Skill::Deception,
            Skill::Intimidation,
            Skill::Performance,
            Skill::Persuasion,
        ];
        let name = name.to_lowercase();
        all.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Characters
// ============================================================================

/// Hit point tracking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }
}

/// Spell slot counts by level (index 0 = level 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellSlots {
    pub remaining: [u8; 9],
}

impl SpellSlots {
    pub fn remaining_at(&self, level: u8) -> u8 {
        if (1..=9).contains(&level) {
            self.remaining[level as usize - 1]
        } else {
            0
        }
    }

    /// Consume one slot at `level`. Returns false when none remain.
    pub fn consume(&mut self, level: u8) -> bool {
        if !(1..=9).contains(&level) {
            return false;
        }
        let slot = &mut self.remaining[level as usize - 1];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    /// The non-empty slot levels as `level -> remaining`, for reporting
    /// back to the model after a cast.
    pub fn as_table(&self) -> HashMap<u8, u8> {
        self.remaining
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(idx, &count)| (idx as u8 + 1, count))
            .collect()
    }
}

/// Death saving throw counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }
}

/// A party member's state.
///
/// Owned by the persistence gateway; the engine reads it through snapshots
/// and writes back only HP, spell slots, and death-save counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterState {
    pub id: CharacterId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub level: u8,
    pub abilities: AbilityScores,
    pub hp: HitPoints,
    pub armor_class: i32,
    pub skill_proficiencies: Vec<Skill>,
    pub save_proficiencies: Vec<Ability>,
    pub cantrips: Vec<String>,
    pub known_spells: Vec<String>,
    pub spell_slots: SpellSlots,
    pub equipment: Vec<String>,
    pub features: Vec<String>,
    pub death_saves: DeathSaves,
}

impl CharacterState {
    /// Level-scaled proficiency bonus: +2 at level 1, +1 every 4 levels.
    pub fn proficiency_bonus(&self) -> i32 {
        2 + (self.level.max(1) as i32 - 1) / 4
    }

    pub fn is_proficient(&self, skill: Skill) -> bool {
        self.skill_proficiencies.contains(&skill)
    }

    /// Skill bonus: ability modifier plus proficiency when trained.
    pub fn skill_bonus(&self, skill: Skill) -> i32 {
        let mut bonus = self.abilities.modifier(skill.ability());
        if self.is_proficient(skill) {
            bonus += self.proficiency_bonus();
        }
        bonus
    }

    /// Saving throw bonus: ability modifier plus proficiency when trained.
    pub fn save_bonus(&self, ability: Ability) -> i32 {
        let mut bonus = self.abilities.modifier(ability);
        if self.save_proficiencies.contains(&ability) {
            bonus += self.proficiency_bonus();
        }
        bonus
    }

    /// Passive score: 10 + skill bonus. No die is rolled.
    pub fn passive_score(&self, skill: Skill) -> i32 {
        10 + self.skill_bonus(skill)
    }
}

// ============================================================================
// NPCs
// ============================================================================

/// Combat-capable NPC stats. Absent for pure social NPCs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcCombatStats {
    pub max_hp: i32,
    pub armor_class: i32,
    pub dexterity: u8,
    pub attack_bonus: i32,
    pub damage_dice: String,
}

impl NpcCombatStats {
    pub fn dexterity_modifier(&self) -> i32 {
        (self.dexterity as i32 - 10).div_euclid(2)
    }
}

/// A non-player character with a private agenda.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub campaign_id: CampaignId,
    pub name: String,
    /// -100 (hostile) .. 100 (devoted).
    pub disposition: i32,
    pub npc_type: String,
    pub goal: String,
    /// 0..=100. Advances only through the drift mechanic; never decreases.
    pub goal_progress: u8,
    pub combat_stats: Option<NpcCombatStats>,
    pub location: Option<LocationId>,
    pub active: bool,
}

impl Npc {
    /// Advance goal progress, capped at 100. Returns the new progress.
    pub fn advance_goal(&mut self, amount: u8) -> u8 {
        self.goal_progress = self.goal_progress.saturating_add(amount).min(100);
        self.goal_progress
    }

    /// Shift disposition, clamped to [-100, 100].
    pub fn adjust_disposition(&mut self, delta: i32) -> i32 {
        self.disposition = (self.disposition + delta).clamp(-100, 100);
        self.disposition
    }

    pub fn goal_complete(&self) -> bool {
        self.goal_progress >= 100
    }
}

// ============================================================================
// Locations
// ============================================================================

/// What kind of hidden content an object is; decides which passive skill
/// can find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenObjectType {
    Clue,
    SecretDoor,
    Item,
    Trap,
}

impl HiddenObjectType {
    /// Clues and secret doors yield to deliberate scrutiny (investigation);
    /// everything else to ambient awareness (perception).
    pub fn detection_skill(&self) -> Skill {
        match self {
            HiddenObjectType::Clue | HiddenObjectType::SecretDoor => Skill::Investigation,
            HiddenObjectType::Item | HiddenObjectType::Trap => Skill::Perception,
        }
    }
}

/// Something concealed in a location. Discovery is one-way: once true,
/// never reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenObject {
    pub name: String,
    pub dc: i32,
    pub object_type: HiddenObjectType,
    pub discovered: bool,
}

/// A place the party can occupy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub description: String,
    pub hidden_objects: Vec<HiddenObject>,
    pub connections: Vec<LocationId>,
    pub visited: bool,
}

// ============================================================================
// Encounters
// ============================================================================

/// One combatant's entry in the initiative order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub id: Uuid,
    pub name: String,
    pub initiative: i32,
    pub is_player: bool,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub conditions: Vec<String>,
}

/// A combat encounter. At most one is active per campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterState {
    pub id: EncounterId,
    pub campaign_id: CampaignId,
    pub active: bool,
    pub round: u32,
    pub turn_index: usize,
    pub combatants: Vec<Combatant>,
}

impl EncounterState {
    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.combatants.get(self.turn_index)
    }

    pub fn next_turn(&mut self) {
        self.turn_index += 1;
        if self.turn_index >= self.combatants.len() {
            self.turn_index = 0;
            self.round += 1;
        }
    }
}

// ============================================================================
// Campaign
// ============================================================================

/// Current interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Exploration,
    Combat,
    Social,
    Rest,
}

impl GameMode {
    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Exploration => "exploration",
            GameMode::Combat => "combat",
            GameMode::Social => "social",
            GameMode::Rest => "rest",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-campaign engine state. Created lazily, mutated every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignState {
    pub id: CampaignId,
    pub owner: UserId,
    pub name: String,
    pub mode: GameMode,
    pub current_location: Option<LocationId>,
    /// Free-form label, e.g. "Day 3, early evening".
    pub in_game_time: String,
    /// Monotonic, campaign-scoped.
    pub turn_number: u64,
    pub session_number: u32,
}

impl CampaignState {
    pub fn new(id: CampaignId, owner: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            owner,
            name: name.into(),
            mode: GameMode::Exploration,
            current_location: None,
            in_game_time: "Day 1, morning".to_string(),
            turn_number: 0,
            session_number: 1,
        }
    }
}

// ============================================================================
// Audit log
// ============================================================================

/// Immutable audit record of a mechanical event. The append-only log of
/// these entries is the source of truth for what actually happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanicsLogEntry {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    pub turn_number: u64,
    pub kind: String,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub summary: String,
    pub detail: serde_json::Value,
    pub hidden: bool,
}

// ============================================================================
// Snapshot
// ============================================================================

/// The consistent read-view assembled for one turn. Prompt construction
/// draws exclusively from this; narration must never reference facts
/// outside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub campaign: CampaignState,
    pub party: Vec<CharacterState>,
    pub location: Option<Location>,
    pub npcs_present: Vec<Npc>,
    pub encounter: Option<EncounterState>,
    pub recent_log: Vec<MechanicsLogEntry>,
    pub new_discoveries: Vec<HiddenObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_character() -> CharacterState {
        CharacterState {
            id: CharacterId::new(),
            campaign_id: CampaignId::new(),
            name: "Brannor".to_string(),
            level: 5,
            abilities: AbilityScores::new(16, 12, 14, 10, 20, 8),
            hp: HitPoints::new(44),
            armor_class: 16,
            skill_proficiencies: vec![Skill::Athletics, Skill::Perception],
            save_proficiencies: vec![Ability::Strength, Ability::Constitution],
            cantrips: vec!["light".to_string()],
            known_spells: vec!["cure wounds".to_string()],
            spell_slots: SpellSlots {
                remaining: [2, 0, 0, 0, 0, 0, 0, 0, 0],
            },
            equipment: vec!["longsword".to_string()],
            features: vec![],
            death_saves: DeathSaves::default(),
        }
    }

    #[test]
    fn test_ability_modifiers() {
        let scores = AbilityScores::new(16, 12, 14, 10, 20, 8);
        assert_eq!(scores.modifier(Ability::Strength), 3);
        assert_eq!(scores.modifier(Ability::Dexterity), 1);
        assert_eq!(scores.modifier(Ability::Intelligence), 0);
        assert_eq!(scores.modifier(Ability::Wisdom), 5);
        assert_eq!(scores.modifier(Ability::Charisma), -1);
    }

    #[test]
    fn test_modifier_floor_division_below_ten() {
        let scores = AbilityScores::new(7, 9, 10, 10, 10, 10);
        assert_eq!(scores.modifier(Ability::Strength), -2);
        assert_eq!(scores.modifier(Ability::Dexterity), -1);
    }

    #[test]
    fn test_proficiency_bonus_scales_with_level() {
        let mut character = sample_character();
        for (level, expected) in [(1, 2), (4, 2), (5, 3), (8, 3), (9, 4), (13, 5), (17, 6)] {
            character.level = level;
            assert_eq!(character.proficiency_bonus(), expected, "level {level}");
        }
    }

    #[test]
    fn test_skill_bonus_with_proficiency() {
        let character = sample_character();
        // STR 16 (+3), proficient in Athletics, level 5 (+3) => +6
        assert_eq!(character.skill_bonus(Skill::Athletics), 6);
        // DEX 12 (+1), not proficient
        assert_eq!(character.skill_bonus(Skill::Stealth), 1);
    }

    #[test]
    fn test_passive_score() {
        let character = sample_character();
        // WIS 20 (+5), proficient in Perception (+3) => passive 18
        assert_eq!(character.passive_score(Skill::Perception), 18);
        // INT 10 (+0), untrained => passive 10
        assert_eq!(character.passive_score(Skill::Investigation), 10);
    }

    #[test]
    fn test_spell_slot_consume() {
        let mut slots = SpellSlots {
            remaining: [2, 1, 0, 0, 0, 0, 0, 0, 0],
        };
        assert!(slots.consume(1));
        assert_eq!(slots.remaining_at(1), 1);
        assert!(slots.consume(2));
        assert!(!slots.consume(2));
        assert!(!slots.consume(3));
        assert!(!slots.consume(0));
        assert!(!slots.consume(10));
    }

    #[test]
    fn test_spell_slot_table_skips_empty_levels() {
        let slots = SpellSlots {
            remaining: [3, 0, 1, 0, 0, 0, 0, 0, 0],
        };
        let table = slots.as_table();
        assert_eq!(table.get(&1), Some(&3));
        assert_eq!(table.get(&3), Some(&1));
        assert!(!table.contains_key(&2));
    }

    #[test]
    fn test_npc_goal_progress_caps_at_100() {
        let mut npc = Npc {
            id: NpcId::new(),
            campaign_id: CampaignId::new(),
            name: "Vex".to_string(),
            disposition: 0,
            npc_type: "rival".to_string(),
            goal: "steal the ledger".to_string(),
            goal_progress: 95,
            combat_stats: None,
            location: None,
            active: true,
        };
        assert_eq!(npc.advance_goal(10), 100);
        assert!(npc.goal_complete());
        assert_eq!(npc.advance_goal(10), 100);
    }

    #[test]
    fn test_npc_disposition_clamps() {
        let mut npc = Npc {
            id: NpcId::new(),
            campaign_id: CampaignId::new(),
            name: "Vex".to_string(),
            disposition: 90,
            npc_type: "rival".to_string(),
            goal: String::new(),
            goal_progress: 0,
            combat_stats: None,
            location: None,
            active: true,
        };
        assert_eq!(npc.adjust_disposition(50), 100);
        assert_eq!(npc.adjust_disposition(-250), -100);
    }

    #[test]
    fn test_detection_skill_by_object_type() {
        assert_eq!(
            HiddenObjectType::Clue.detection_skill(),
            Skill::Investigation
        );
        assert_eq!(
            HiddenObjectType::SecretDoor.detection_skill(),
            Skill::Investigation
        );
        assert_eq!(HiddenObjectType::Item.detection_skill(), Skill::Perception);
        assert_eq!(HiddenObjectType::Trap.detection_skill(), Skill::Perception);
    }

    #[test]
    fn test_encounter_turn_wraps_and_advances_round() {
        let mut encounter = EncounterState {
            id: EncounterId::new(),
            campaign_id: CampaignId::new(),
            active: true,
            round: 1,
            turn_index: 0,
            combatants: vec![
                Combatant {
                    id: Uuid::new_v4(),
                    name: "Brannor".to_string(),
                    initiative: 18,
                    is_player: true,
                    hp: 30,
                    max_hp: 30,
                    armor_class: 16,
                    conditions: vec![],
                },
                Combatant {
                    id: Uuid::new_v4(),
                    name: "Bandit".to_string(),
                    initiative: 11,
                    is_player: false,
                    hp: 11,
                    max_hp: 11,
                    armor_class: 12,
                    conditions: vec![],
                },
            ],
        };
        encounter.next_turn();
        assert_eq!(encounter.turn_index, 1);
        assert_eq!(encounter.round, 1);
        encounter.next_turn();
        assert_eq!(encounter.turn_index, 0);
        assert_eq!(encounter.round, 2);
    }

    #[test]
    fn test_skill_from_name() {
        assert_eq!(Skill::from_name("sleight_of_hand"), Some(Skill::SleightOfHand));
        assert_eq!(Skill::from_name("Perception"), Some(Skill::Perception));
        assert_eq!(Skill::from_name("juggling"), None);
    }
}
