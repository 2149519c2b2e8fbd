//! Rules resolvers.
//!
//! Each resolver is a pure function over snapshot state: it rolls whatever
//! dice it needs, applies the rules, and returns a tagged
//! [`MechanicsResult`]. Resolvers never mutate the world; write-backs (HP,
//! spell slots, goal progress, discoveries) happen through the gateway using
//! the values carried in the outcome structs.
//!
//! Nothing here is ever an error: failed checks, insufficient spell slots,
//! and misses are data, returned to both the model and the caller.

use crate::dice::{self, Advantage, D20Roll, DiceNotation, NotationRoll};
use crate::world::{
    Ability, CharacterState, Combatant, DeathSaves, HitPoints, Location, MechanicsLogEntry, Npc,
    Skill, SpellSlots,
};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Fixed goal-progress increment applied by the drift mechanic.
pub const GOAL_DRIFT_INCREMENT: u8 = 10;

/// Classification of a mechanical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanicsKind {
    SkillCheck,
    SavingThrow,
    Attack,
    SpellCast,
    HpChange,
    Initiative,
    PassiveCheck,
    DeathSave,
    GoalDrift,
    DiceRoll,
    EncounterStart,
    EncounterEnd,
    LocationMove,
    DispositionShift,
    GoalUpdate,
}

impl MechanicsKind {
    pub fn name(&self) -> &'static str {
        match self {
            MechanicsKind::SkillCheck => "skill_check",
            MechanicsKind::SavingThrow => "saving_throw",
            MechanicsKind::Attack => "attack",
            MechanicsKind::SpellCast => "spell_cast",
            MechanicsKind::HpChange => "hp_change",
            MechanicsKind::Initiative => "initiative",
            MechanicsKind::PassiveCheck => "passive_check",
            MechanicsKind::DeathSave => "death_save",
            MechanicsKind::GoalDrift => "goal_drift",
            MechanicsKind::DiceRoll => "dice_roll",
            MechanicsKind::EncounterStart => "encounter_start",
            MechanicsKind::EncounterEnd => "encounter_end",
            MechanicsKind::LocationMove => "location_move",
            MechanicsKind::DispositionShift => "disposition_shift",
            MechanicsKind::GoalUpdate => "goal_update",
        }
    }
}

/// Structured detail for one mechanical event, closed over every resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MechanicsDetail {
    SkillCheck {
        skill: Skill,
        dc: i32,
        roll: D20Roll,
        bonus: i32,
        total: i32,
    },
    SavingThrow {
        ability: Ability,
        dc: i32,
        roll: D20Roll,
        bonus: i32,
        total: i32,
    },
    Attack {
        roll: D20Roll,
        attack_bonus: i32,
        total: i32,
        target_ac: i32,
        hit: bool,
        critical: bool,
        damage: Option<NotationRoll>,
        critical_dice: Option<NotationRoll>,
        total_damage: i32,
    },
    SpellCast {
        spell: String,
        spell_level: u8,
        cantrip: bool,
        slots_remaining: Option<HashMap<u8, u8>>,
    },
    HpChange {
        previous_hp: i32,
        delta: i32,
        new_hp: i32,
        max_hp: i32,
        unconscious: bool,
        dead: bool,
    },
    Initiative {
        order: Vec<InitiativeEntry>,
    },
    PassiveCheck {
        object: String,
        skill: Skill,
        dc: i32,
        passive_score: i32,
    },
    DeathSave {
        roll: u32,
        successes: u8,
        failures: u8,
        stabilized: bool,
        dead: bool,
        recovered: bool,
    },
    GoalDrift {
        npc: String,
        progress: u8,
        complete: bool,
    },
    DiceRoll {
        purpose: String,
        roll: NotationRoll,
    },
    EncounterStart {
        combatants: Vec<String>,
    },
    EncounterEnd,
    LocationMove {
        from: Option<String>,
        to: String,
    },
    DispositionShift {
        npc: String,
        delta: i32,
        new_disposition: i32,
    },
    GoalUpdate {
        npc: String,
        goal: String,
    },
}

/// One line of a resolved initiative order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub name: String,
    pub roll: u32,
    pub modifier: i32,
    pub total: i32,
}

/// The outcome of one mechanical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MechanicsResult {
    pub kind: MechanicsKind,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub success: bool,
    pub summary: String,
    pub detail: MechanicsDetail,
    /// Hidden results are logged and returned to the caller but never
    /// surfaced to the narrating model.
    pub hidden: bool,
}

impl MechanicsResult {
    /// Convert into an immutable audit record.
    pub fn to_log_entry(&self, campaign_id: crate::world::CampaignId, turn: u64) -> MechanicsLogEntry {
        MechanicsLogEntry {
            id: Uuid::new_v4(),
            campaign_id,
            turn_number: turn,
            kind: self.kind.name().to_string(),
            actor: self.actor.clone(),
            target: self.target.clone(),
            summary: self.summary.clone(),
            detail: serde_json::to_value(&self.detail).unwrap_or(serde_json::Value::Null),
            hidden: self.hidden,
        }
    }
}

// ============================================================================
// Checks and saves
// ============================================================================

/// Resolve a skill check against a DC.
pub fn skill_check(
    character: &CharacterState,
    skill: Skill,
    dc: i32,
    advantage: Advantage,
) -> MechanicsResult {
    skill_check_with(&mut OsRng, character, skill, dc, advantage)
}

pub fn skill_check_with<R: Rng>(
    rng: &mut R,
    character: &CharacterState,
    skill: Skill,
    dc: i32,
    advantage: Advantage,
) -> MechanicsResult {
    let roll = dice::roll_d20_with(rng, advantage);
    let bonus = character.skill_bonus(skill);
    let total = roll.natural as i32 + bonus;
    let success = check_passes(&roll, total, dc);

    MechanicsResult {
        kind: MechanicsKind::SkillCheck,
        actor: Some(character.name.clone()),
        target: None,
        success,
        summary: format!(
            "{} {} check: {} + {} = {} vs DC {}: {}",
            character.name,
            skill.name(),
            roll.natural,
            bonus,
            total,
            dc,
            outcome_word(&roll, success),
        ),
        detail: MechanicsDetail::SkillCheck {
            skill,
            dc,
            roll,
            bonus,
            total,
        },
        hidden: false,
    }
}

/// Resolve a saving throw against a DC.
pub fn saving_throw(
    character: &CharacterState,
    ability: Ability,
    dc: i32,
    advantage: Advantage,
) -> MechanicsResult {
    saving_throw_with(&mut OsRng, character, ability, dc, advantage)
}

pub fn saving_throw_with<R: Rng>(
    rng: &mut R,
    character: &CharacterState,
    ability: Ability,
    dc: i32,
    advantage: Advantage,
) -> MechanicsResult {
    let roll = dice::roll_d20_with(rng, advantage);
    let bonus = character.save_bonus(ability);
    let total = roll.natural as i32 + bonus;
    let success = check_passes(&roll, total, dc);

    MechanicsResult {
        kind: MechanicsKind::SavingThrow,
        actor: Some(character.name.clone()),
        target: None,
        success,
        summary: format!(
            "{} {} save: {} + {} = {} vs DC {}: {}",
            character.name,
            ability.name(),
            roll.natural,
            bonus,
            total,
            dc,
            outcome_word(&roll, success),
        ),
        detail: MechanicsDetail::SavingThrow {
            ability,
            dc,
            roll,
            bonus,
            total,
        },
        hidden: false,
    }
}

/// Natural 20 forces success and natural 1 forces failure, overriding the
/// numeric comparison.
fn check_passes(roll: &D20Roll, total: i32, dc: i32) -> bool {
    if roll.is_natural_20() {
        true
    } else if roll.is_natural_1() {
        false
    } else {
        total >= dc
    }
}

fn outcome_word(roll: &D20Roll, success: bool) -> &'static str {
    if roll.is_natural_20() {
        "natural 20, success"
    } else if roll.is_natural_1() {
        "natural 1, failure"
    } else if success {
        "success"
    } else {
        "failure"
    }
}

// ============================================================================
// Attacks
// ============================================================================

/// Resolve an attack roll and, on a hit, its damage.
pub fn attack(
    attacker: &str,
    attack_bonus: i32,
    target: &str,
    target_ac: i32,
    damage_notation: &str,
    advantage: Advantage,
) -> MechanicsResult {
    attack_with(
        &mut OsRng,
        attacker,
        attack_bonus,
        target,
        target_ac,
        damage_notation,
        advantage,
    )
}

pub fn attack_with<R: Rng>(
    rng: &mut R,
    attacker: &str,
    attack_bonus: i32,
    target: &str,
    target_ac: i32,
    damage_notation: &str,
    advantage: Advantage,
) -> MechanicsResult {
    let roll = dice::roll_d20_with(rng, advantage);
    let total = roll.natural as i32 + attack_bonus;

    // Natural 20 always hits (critically); natural 1 always misses.
    let critical = roll.is_natural_20();
    let hit = critical || (!roll.is_natural_1() && total >= target_ac);

    let notation = DiceNotation::parse(damage_notation);
    let (damage, critical_dice, total_damage) = if hit {
        let damage = notation.roll_with(rng);
        // On a critical the dice are rolled a second time and added; the
        // flat modifier applies once.
        let critical_dice = critical.then(|| {
            DiceNotation {
                modifier: 0,
                ..notation
            }
            .roll_with(rng)
        });
        let total = damage.total + critical_dice.as_ref().map_or(0, |d| d.total);
        (Some(damage), critical_dice, total.max(0))
    } else {
        (None, None, 0)
    };

    let summary = if hit {
        format!(
            "{attacker} attacks {target}: {} + {attack_bonus} = {total} vs AC {target_ac}, {} for {total_damage} damage",
            roll.natural,
            if critical { "critical hit" } else { "hit" },
        )
    } else {
        format!(
            "{attacker} attacks {target}: {} + {attack_bonus} = {total} vs AC {target_ac}, miss",
            roll.natural,
        )
    };

    MechanicsResult {
        kind: MechanicsKind::Attack,
        actor: Some(attacker.to_string()),
        target: Some(target.to_string()),
        success: hit,
        summary,
        detail: MechanicsDetail::Attack {
            roll,
            attack_bonus,
            total,
            target_ac,
            hit,
            critical,
            damage,
            critical_dice,
            total_damage,
        },
        hidden: false,
    }
}

// ============================================================================
// Spellcasting
// ============================================================================

/// The outcome of a spell cast: the result plus, on a successful leveled
/// cast, the slot table for the gateway to write back.
#[derive(Debug, Clone)]
pub struct SpellCastOutcome {
    pub result: MechanicsResult,
    pub updated_slots: Option<SpellSlots>,
}

/// Resolve a spell cast. Cantrips (level 0) always succeed and never touch
/// slots; leveled spells fail when no slot of that level remains.
pub fn cast_spell(caster: &CharacterState, spell_name: &str, spell_level: u8) -> SpellCastOutcome {
    if spell_level == 0 {
        return SpellCastOutcome {
            result: MechanicsResult {
                kind: MechanicsKind::SpellCast,
                actor: Some(caster.name.clone()),
                target: None,
                success: true,
                summary: format!("{} casts the cantrip {spell_name}", caster.name),
                detail: MechanicsDetail::SpellCast {
                    spell: spell_name.to_string(),
                    spell_level: 0,
                    cantrip: true,
                    slots_remaining: None,
                },
                hidden: false,
            },
            updated_slots: None,
        };
    }

    if caster.spell_slots.remaining_at(spell_level) == 0 {
        return SpellCastOutcome {
            result: MechanicsResult {
                kind: MechanicsKind::SpellCast,
                actor: Some(caster.name.clone()),
                target: None,
                success: false,
                summary: format!(
                    "{} cannot cast {spell_name}: no level {spell_level} spell slots remaining",
                    caster.name
                ),
                detail: MechanicsDetail::SpellCast {
                    spell: spell_name.to_string(),
                    spell_level,
                    cantrip: false,
                    slots_remaining: Some(caster.spell_slots.as_table()),
                },
                hidden: false,
            },
            updated_slots: None,
        };
    }

    let mut slots = caster.spell_slots.clone();
    slots.consume(spell_level);

    SpellCastOutcome {
        result: MechanicsResult {
            kind: MechanicsKind::SpellCast,
            actor: Some(caster.name.clone()),
            target: None,
            success: true,
            summary: format!(
                "{} casts {spell_name} using a level {spell_level} slot ({} remaining)",
                caster.name,
                slots.remaining_at(spell_level)
            ),
            detail: MechanicsDetail::SpellCast {
                spell: spell_name.to_string(),
                spell_level,
                cantrip: false,
                slots_remaining: Some(slots.as_table()),
            },
            hidden: false,
        },
        updated_slots: Some(slots),
    }
}

// ============================================================================
// Hit points
// ============================================================================

/// The outcome of an HP change: the result plus the clamped value for the
/// gateway to write back.
#[derive(Debug, Clone)]
pub struct HpChangeOutcome {
    pub result: MechanicsResult,
    pub new_hp: i32,
    pub unconscious: bool,
    pub dead: bool,
}

/// Apply a signed HP delta, clamping into `[0, max]`.
///
/// Unconsciousness is flagged when the new HP hits 0; instant death when
/// the unclamped result would be at or below negative maximum.
pub fn apply_hp_change(target: &str, hp: HitPoints, delta: i32) -> HpChangeOutcome {
    let raw = hp.current + delta;
    let new_hp = raw.clamp(0, hp.maximum);
    let unconscious = new_hp == 0;
    let dead = raw <= -hp.maximum;

    let summary = if dead {
        format!("{target} takes a mortal blow ({} -> dead)", hp.current)
    } else if unconscious {
        format!("{target} drops to 0 HP and falls unconscious")
    } else if delta < 0 {
        format!("{target} takes {} damage ({} -> {new_hp})", -delta, hp.current)
    } else {
        format!("{target} regains {delta} HP ({} -> {new_hp})", hp.current)
    };

    HpChangeOutcome {
        result: MechanicsResult {
            kind: MechanicsKind::HpChange,
            actor: None,
            target: Some(target.to_string()),
            success: true,
            summary,
            detail: MechanicsDetail::HpChange {
                previous_hp: hp.current,
                delta,
                new_hp,
                max_hp: hp.maximum,
                unconscious,
                dead,
            },
            hidden: false,
        },
        new_hp,
        unconscious,
        dead,
    }
}

// ============================================================================
// Initiative
// ============================================================================

/// One participant entering combat, before initiative is rolled.
#[derive(Debug, Clone)]
pub struct InitiativeParticipant {
    pub id: Uuid,
    pub name: String,
    pub dex_modifier: i32,
    pub is_player: bool,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
}

/// The outcome of rolling initiative: the result plus the ordered
/// combatant list for the new encounter.
#[derive(Debug, Clone)]
pub struct InitiativeOutcome {
    pub result: MechanicsResult,
    pub combatants: Vec<Combatant>,
}

/// Roll d20 + dexterity modifier for every participant and sort
/// descending. Ties keep the given order (stable sort, no tiebreak roll).
pub fn roll_initiative(participants: &[InitiativeParticipant]) -> InitiativeOutcome {
    roll_initiative_with(&mut OsRng, participants)
}

pub fn roll_initiative_with<R: Rng>(
    rng: &mut R,
    participants: &[InitiativeParticipant],
) -> InitiativeOutcome {
    let mut combatants: Vec<Combatant> = Vec::with_capacity(participants.len());
    let mut entries: Vec<InitiativeEntry> = Vec::with_capacity(participants.len());

    for p in participants {
        let roll = dice::roll_die_with(rng, 20);
        let total = roll as i32 + p.dex_modifier;
        entries.push(InitiativeEntry {
            name: p.name.clone(),
            roll,
            modifier: p.dex_modifier,
            total,
        });
        combatants.push(Combatant {
            id: p.id,
            name: p.name.clone(),
            initiative: total,
            is_player: p.is_player,
            hp: p.hp,
            max_hp: p.max_hp,
            armor_class: p.armor_class,
            conditions: Vec::new(),
        });
    }

    combatants.sort_by(|a, b| b.initiative.cmp(&a.initiative));
    entries.sort_by(|a, b| b.total.cmp(&a.total));

    let order: Vec<String> = combatants
        .iter()
        .map(|c| format!("{} ({})", c.name, c.initiative))
        .collect();

    InitiativeOutcome {
        result: MechanicsResult {
            kind: MechanicsKind::Initiative,
            actor: None,
            target: None,
            success: true,
            summary: format!("Initiative order: {}", order.join(", ")),
            detail: MechanicsDetail::Initiative { order: entries },
            hidden: false,
        },
        combatants,
    }
}

// ============================================================================
// Passive detection
// ============================================================================

/// A hidden object found by a silent passive check.
#[derive(Debug, Clone)]
pub struct PassiveDiscovery {
    pub object_name: String,
    pub finder: String,
    pub result: MechanicsResult,
}

/// Compare each party member's passive score against every undiscovered
/// hidden object in the location. The first qualifying member (in party
/// order) finds the object. Results are always hidden: the DC and even the
/// fact that a check happened never reach the narration directly.
pub fn passive_checks(party: &[CharacterState], location: &Location) -> Vec<PassiveDiscovery> {
    let mut discoveries = Vec::new();

    for object in location.hidden_objects.iter().filter(|o| !o.discovered) {
        let skill = object.object_type.detection_skill();
        let Some((finder, score)) = party
            .iter()
            .map(|c| (c, c.passive_score(skill)))
            .find(|(_, score)| *score >= object.dc)
        else {
            continue;
        };

        discoveries.push(PassiveDiscovery {
            object_name: object.name.clone(),
            finder: finder.name.clone(),
            result: MechanicsResult {
                kind: MechanicsKind::PassiveCheck,
                actor: Some(finder.name.clone()),
                target: Some(object.name.clone()),
                success: true,
                summary: format!(
                    "{} passively notices {} (passive {} {} vs DC {})",
                    finder.name,
                    object.name,
                    skill.name(),
                    score,
                    object.dc
                ),
                detail: MechanicsDetail::PassiveCheck {
                    object: object.name.clone(),
                    skill,
                    dc: object.dc,
                    passive_score: score,
                },
                hidden: true,
            },
        });
    }

    discoveries
}

// ============================================================================
// Death saves
// ============================================================================

/// The outcome of a death saving throw, with updated counters for the
/// gateway to write back.
#[derive(Debug, Clone)]
pub struct DeathSaveOutcome {
    pub result: MechanicsResult,
    pub saves: DeathSaves,
    pub stabilized: bool,
    pub dead: bool,
    pub recovered: bool,
}

/// Roll a death save: natural 20 clears both counters and signals
/// recovery, natural 1 counts as two failures, 10+ a success, anything
/// else a failure. Three successes stabilize; three failures kill.
pub fn death_save(character: &CharacterState) -> DeathSaveOutcome {
    death_save_with(&mut OsRng, character)
}

pub fn death_save_with<R: Rng>(rng: &mut R, character: &CharacterState) -> DeathSaveOutcome {
    let roll = dice::roll_die_with(rng, 20);
    let mut saves = character.death_saves;
    let mut recovered = false;

    match roll {
        20 => {
            saves.reset();
            recovered = true;
        }
        1 => saves.failures = (saves.failures + 2).min(3),
        10..=19 => saves.successes = (saves.successes + 1).min(3),
        _ => saves.failures = (saves.failures + 1).min(3),
    }

    let stabilized = saves.successes >= 3;
    let dead = saves.failures >= 3;

    let state = if recovered {
        "springs back to consciousness".to_string()
    } else if dead {
        "succumbs".to_string()
    } else if stabilized {
        "stabilizes".to_string()
    } else {
        format!("{} successes, {} failures", saves.successes, saves.failures)
    };

    DeathSaveOutcome {
        result: MechanicsResult {
            kind: MechanicsKind::DeathSave,
            actor: Some(character.name.clone()),
            target: None,
            success: recovered || roll >= 10,
            summary: format!("{} death save: rolled {roll}, {state}", character.name),
            detail: MechanicsDetail::DeathSave {
                roll,
                successes: saves.successes,
                failures: saves.failures,
                stabilized,
                dead,
                recovered,
            },
            hidden: false,
        },
        saves,
        stabilized,
        dead,
        recovered,
    }
}

// ============================================================================
// NPC goals
// ============================================================================

/// The outcome of one goal-drift tick, with the new progress for the
/// gateway to write back.
#[derive(Debug, Clone)]
pub struct GoalDriftOutcome {
    pub result: MechanicsResult,
    pub new_progress: u8,
    pub newly_complete: bool,
}

/// Advance an NPC's private goal by the fixed increment, capped at 100.
/// Always hidden from narration; completion is signaled the first time the
/// cap is reached.
pub fn npc_goal_drift(npc: &Npc) -> GoalDriftOutcome {
    let new_progress = npc
        .goal_progress
        .saturating_add(GOAL_DRIFT_INCREMENT)
        .min(100);
    let newly_complete = new_progress >= 100 && npc.goal_progress < 100;

    GoalDriftOutcome {
        result: MechanicsResult {
            kind: MechanicsKind::GoalDrift,
            actor: Some(npc.name.clone()),
            target: None,
            success: true,
            summary: format!(
                "{}'s goal \"{}\" advances to {new_progress}%{}",
                npc.name,
                npc.goal,
                if newly_complete { " (complete)" } else { "" }
            ),
            detail: MechanicsDetail::GoalDrift {
                npc: npc.name.clone(),
                progress: new_progress,
                complete: new_progress >= 100,
            },
            hidden: true,
        },
        new_progress,
        newly_complete,
    }
}

// ============================================================================
// Free-form rolls and event records
// ============================================================================

/// Roll arbitrary notation on the model's behalf (lenient parsing: garbage
/// notation becomes a single d20).
pub fn roll_dice(notation: &str, purpose: &str) -> MechanicsResult {
    let roll = dice::roll(notation);
    MechanicsResult {
        kind: MechanicsKind::DiceRoll,
        actor: None,
        target: None,
        success: true,
        summary: format!("Rolled {roll} for {purpose}"),
        detail: MechanicsDetail::DiceRoll {
            purpose: purpose.to_string(),
            roll,
        },
        hidden: false,
    }
}

/// Event record for an encounter starting.
pub fn encounter_started(combatants: Vec<String>) -> MechanicsResult {
    MechanicsResult {
        kind: MechanicsKind::EncounterStart,
        actor: None,
        target: None,
        success: true,
        summary: format!("Combat begins: {}", combatants.join(", ")),
        detail: MechanicsDetail::EncounterStart { combatants },
        hidden: false,
    }
}

/// Event record for an encounter ending.
pub fn encounter_ended() -> MechanicsResult {
    MechanicsResult {
        kind: MechanicsKind::EncounterEnd,
        actor: None,
        target: None,
        success: true,
        summary: "Combat ends".to_string(),
        detail: MechanicsDetail::EncounterEnd,
        hidden: false,
    }
}

/// Event record for the party moving between locations.
pub fn location_moved(from: Option<String>, to: String) -> MechanicsResult {
    let summary = match &from {
        Some(from) => format!("The party moves from {from} to {to}"),
        None => format!("The party arrives at {to}"),
    };
    MechanicsResult {
        kind: MechanicsKind::LocationMove,
        actor: None,
        target: Some(to.clone()),
        success: true,
        summary,
        detail: MechanicsDetail::LocationMove { from, to },
        hidden: false,
    }
}

/// Event record for an NPC's disposition shifting.
pub fn disposition_shifted(npc: &str, delta: i32, new_disposition: i32) -> MechanicsResult {
    MechanicsResult {
        kind: MechanicsKind::DispositionShift,
        actor: Some(npc.to_string()),
        target: None,
        success: true,
        summary: format!("{npc}'s disposition shifts by {delta} to {new_disposition}"),
        detail: MechanicsDetail::DispositionShift {
            npc: npc.to_string(),
            delta,
            new_disposition,
        },
        hidden: false,
    }
}

/// Event record for an NPC taking up a new private goal. Hidden: the
/// party never sees another creature's agenda change.
pub fn goal_updated(npc: &str, goal: &str) -> MechanicsResult {
    MechanicsResult {
        kind: MechanicsKind::GoalUpdate,
        actor: Some(npc.to_string()),
        target: None,
        success: true,
        summary: format!("{npc} now pursues: {goal}"),
        detail: MechanicsDetail::GoalUpdate {
            npc: npc.to_string(),
            goal: goal.to_string(),
        },
        hidden: true,
    }
}
