//! The mechanical tool catalog exposed to the narrating model.
//!
//! The model never computes a mechanical fact itself: it requests one of
//! these named operations, the arguments are validated against the declared
//! schema, and the matching rules resolver produces the outcome. Dispatch is
//! a closed enum; unknown names and malformed arguments become error
//! values the model can react to narratively.

use crate::dice::Advantage;
use crate::world::{Ability, Skill};
use lazy_static::lazy_static;
use llm::ToolSpec;
use serde_json::{json, Value};
use thiserror::Error;

/// A validated, dispatchable tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SkillCheck {
        character: String,
        skill: Skill,
        dc: i32,
        advantage: Advantage,
    },
    SavingThrow {
        character: String,
        ability: Ability,
        dc: i32,
        advantage: Advantage,
    },
    Attack {
        attacker: String,
        target: String,
        damage: Option<String>,
        advantage: Advantage,
    },
    CastSpell {
        character: String,
        spell: String,
        spell_level: u8,
    },
    HpChange {
        target: String,
        delta: i32,
    },
    StartEncounter {
        enemies: Vec<EnemySpec>,
    },
    EndEncounter,
    RollDice {
        notation: String,
        purpose: String,
    },
    DeathSave {
        character: String,
    },
    MoveLocation {
        location: String,
    },
    AdjustDisposition {
        npc: String,
        delta: i32,
    },
    UpdateNpcGoal {
        npc: String,
        goal: String,
    },
}

/// An enemy entry for `start_encounter`. Stats are optional: a named NPC's
/// stored combat stats win over anything supplied here.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemySpec {
    pub name: String,
    pub max_hp: Option<i32>,
    pub armor_class: Option<i32>,
    pub dexterity: Option<u8>,
}

/// Why a requested invocation could not be dispatched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolCallError {
    fn invalid(tool: &str, message: impl Into<String>) -> Self {
        ToolCallError::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a named invocation against its schema and build the dispatch
/// value.
pub fn parse_tool_call(name: &str, input: &Value) -> Result<ToolCall, ToolCallError> {
    match name {
        "skill_check" => Ok(ToolCall::SkillCheck {
            character: require_str(name, input, "character")?,
            skill: Skill::from_name(&require_str(name, input, "skill")?)
                .ok_or_else(|| ToolCallError::invalid(name, "unrecognized skill"))?,
            dc: require_i64(name, input, "dc")? as i32,
            advantage: parse_advantage(input)
        }),
        "saving_throw" => Ok(ToolCall::SavingThrow {
            character: require_str(name, input, "character")?,
            ability: Ability::from_name(&require_str(name, input, "ability")?)
                .ok_or_else(|| ToolCallError::invalid(name, "unrecognized ability"))?,
            dc: require_i64(name, input, "dc")? as i32,
            advantage: parse_advantage(input)
        }),
        "attack" => Ok(ToolCall::Attack {
            attacker: require_str(name, input, "attacker")?,
            target: require_str(name, input, "target")?,
            damage: optional_str(input, "damage"),
            advantage: parse_advantage(input)
        }),
        "cast_spell" => {
            let spell_level = require_i64(name, input, "spell_level")?;
            if !(0..=9).contains(&spell_level) {
                return Err(ToolCallError::invalid(name, "spell_level must be 0-9"));
            }
            Ok(ToolCall::CastSpell {
                character: require_str(name, input, "character")?,
                spell: require_str(name, input, "spell")?,
                spell_level: spell_level as u8,
            })
        }
        "apply_hp_change" => {
            let delta = require_i64(name, input, "delta")?;
            if delta == 0 {
                return Err(ToolCallError::invalid(name, "delta must be non-zero"));
            }
            Ok(ToolCall::HpChange {
                target: require_str(name, input, "target")?,
                delta: delta as i32,
            })
        }
        "start_encounter" => {
            let enemies = input
                .get("enemies")
                .and_then(Value::as_array)
                .ok_or_else(|| ToolCallError::invalid(name, "missing field: enemies"))?;
            if enemies.is_empty() {
                return Err(ToolCallError::invalid(name, "enemies must not be empty"));
            }
            let enemies = enemies
                .iter()
                .map(|enemy| {
                    Ok(EnemySpec {
                        name: enemy
                            .get("name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| ToolCallError::invalid(name, "enemy missing name"))?
                            .to_string(),
                        max_hp: enemy.get("max_hp").and_then(Value::as_i64).map(|v| v as i32),
                        armor_class: enemy
                            .get("armor_class")
                            .and_then(Value::as_i64)
                            .map(|v| v as i32),
                        dexterity: enemy
                            .get("dexterity")
                            .and_then(Value::as_u64)
                            .map(|v| v.min(30) as u8),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ToolCall::StartEncounter { enemies })
        }
        "end_encounter" => Ok(ToolCall::EndEncounter),
        "roll_dice" => Ok(ToolCall::RollDice {
            notation: require_str(name, input, "notation")?,
            purpose: optional_str(input, "purpose").unwrap_or_else(|| "general roll".to_string())
        }),
        "death_save" => Ok(ToolCall::DeathSave {
            character: require_str(name, input, "character")?
        }),
        "move_location" => Ok(ToolCall::MoveLocation {
            location: require_str(name, input, "location")?
        }),
        "adjust_npc_disposition" => Ok(ToolCall::AdjustDisposition {
            npc: require_str(name, input, "npc")?,
            delta: require_i64(name, input, "delta")? as i32
        }),
        "update_npc_goal" => Ok(ToolCall::UpdateNpcGoal {
            npc: require_str(name, input, "npc")?,
            goal: require_str(name, input, "goal")?
        }),
        other => Err(ToolCallError::UnknownTool(other.to_string())),
    }
}

fn require_str(tool: &str, input: &Value, field: &str) -> Result<String, ToolCallError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolCallError::invalid(tool, format!("missing field: {field}")))
}

fn optional_str(input: &Value, field: &str) -> Option<String> {
    input
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn require_i64(tool: &str, input: &Value, field: &str) -> Result<i64, ToolCallError> {
    input
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolCallError::invalid(tool, format!("missing field: {field}")))
}

fn parse_advantage(input: &Value) -> Advantage {
    match input.get("advantage").and_then(Value::as_str) {
        Some("advantage") => Advantage::Advantage,
        Some("disadvantage") => Advantage::Disadvantage,
        _ => Advantage::Normal,
    }
}

/// The fixed tool catalog.
pub struct GmTools;

impl GmTools {
    /// Every tool definition, for the chat request.
    pub fn all() -> Vec<ToolSpec> {
        CATALOG.clone()
    }

    pub fn names() -> Vec<&'static str> {
        vec![
            "skill_check",
            "saving_throw",
            "attack",
            "cast_spell",
            "apply_hp_change",
            "start_encounter",
            "end_encounter",
            "roll_dice",
            "death_save",
            "move_location",
            "adjust_npc_disposition",
            "update_npc_goal",
        ]
    }
}

lazy_static! {
    static ref CATALOG: Vec<ToolSpec> = build_catalog();
}

fn build_catalog() -> Vec<ToolSpec> {
    let advantage_schema = json!({
        "type": "string",
        "enum": ["normal", "advantage", "disadvantage"],
        "description": "Advantage state for the roll"
    });

    vec![
        ToolSpec {
            name: "skill_check".to_string(),
            description: "Have a party member make a skill check against a DC. The engine rolls \
                          the d20 and applies their modifiers."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Name of the party member"},
                    "skill": {
                        "type": "string",
                        "enum": ["athletics", "acrobatics", "sleight_of_hand", "stealth",
                                 "arcana", "history", "investigation", "nature", "religion",
                                 "animal_handling", "insight", "medicine", "perception", "survival",
                                 "deception", "intimidation", "performance", "persuasion"],
                        "description": "The skill to check"
                    },
                    "dc": {"type": "integer", "description": "Difficulty Class"},
                    "advantage": advantage_schema.clone(),
                },
                "required": ["character", "skill", "dc"]
            }),
        },
        ToolSpec {
            name: "saving_throw".to_string(),
            description: "Have a party member make a saving throw against a DC.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Name of the party member"},
                    "ability": {
                        "type": "string",
                        "enum": ["strength", "dexterity", "constitution", "intelligence", "wisdom", "charisma"],
                        "description": "The ability for the save"
                    },
                    "dc": {"type": "integer", "description": "Difficulty Class"},
                    "advantage": advantage_schema.clone(),
                },
                "required": ["character", "ability", "dc"]
            }),
        },
        ToolSpec {
            name: "attack".to_string(),
            description: "Resolve an attack from one combatant against another. The engine rolls \
                          to-hit against the target's armor class and rolls damage on a hit \
                          (critical hits double the dice)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "attacker": {"type": "string", "description": "Name of the attacker (party member or NPC)"},
                    "target": {"type": "string", "description": "Name of the target"},
                    "damage": {"type": "string", "description": "Damage notation for the attacker's weapon, e.g. '1d8+3'. Ignored for NPCs with stored stats."},
                    "advantage": advantage_schema.clone(),
                },
                "required": ["attacker", "target"]
            }),
        },
        ToolSpec {
            name: "cast_spell".to_string(),
            description: "Cast a spell. Level 0 is a cantrip and always succeeds; leveled spells \
                          consume a spell slot and fail if none remain."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Name of the caster"},
                    "spell": {"type": "string", "description": "Name of the spell"},
                    "spell_level": {"type": "integer", "minimum": 0, "maximum": 9, "description": "Slot level, 0 for cantrips"},
                },
                "required": ["character", "spell", "spell_level"]
            }),
        },
        ToolSpec {
            name: "apply_hp_change".to_string(),
            description: "Apply damage (negative) or healing (positive) to a party member or an \
                          encounter combatant. The engine clamps HP and reports unconsciousness \
                          or death."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "Name of the target"},
                    "delta": {"type": "integer", "description": "Signed HP change; damage is negative"},
                },
                "required": ["target", "delta"]
            }),
        },
        ToolSpec {
            name: "start_encounter".to_string(),
            description: "Start a combat encounter against the listed enemies. Initiative is \
                          rolled for the whole party and every enemy; any prior encounter ends."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "enemies": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "max_hp": {"type": "integer"},
                                "armor_class": {"type": "integer"},
                                "dexterity": {"type": "integer"}
                            },
                            "required": ["name"]
                        },
                        "description": "Enemy combatants. A known NPC's stored stats override these fields."
                    }
                },
                "required": ["enemies"]
            }),
        },
        ToolSpec {
            name: "end_encounter".to_string(),
            description: "End the current combat encounter.".to_string(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        },
        ToolSpec {
            name: "roll_dice".to_string(),
            description: "Roll arbitrary dice notation (e.g. '2d6+3') for anything not covered \
                          by a dedicated tool."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "notation": {"type": "string", "description": "Dice notation"},
                    "purpose": {"type": "string", "description": "What the roll is for"},
                },
                "required": ["notation"]
            }),
        },
        ToolSpec {
            name: "death_save".to_string(),
            description: "Roll a death saving throw for a party member at 0 HP. Three successes \
                          stabilize, three failures kill; a natural 20 means recovery."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Name of the dying party member"},
                },
                "required": ["character"]
            }),
        },
        ToolSpec {
            name: "move_location".to_string(),
            description: "Move the party to a known location when they travel.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "Name of the destination location"},
                },
                "required": ["location"]
            }),
        },
        ToolSpec {
            name: "adjust_npc_disposition".to_string(),
            description: "Shift an NPC's disposition toward the party after a social beat. \
                          Positive warms, negative sours; the engine clamps to [-100, 100]."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "npc": {"type": "string", "description": "Name of the NPC"},
                    "delta": {"type": "integer", "description": "Signed disposition change"},
                },
                "required": ["npc", "delta"]
            }),
        },
        ToolSpec {
            name: "update_npc_goal".to_string(),
            description: "Give an NPC a new private goal. Progress restarts at zero and advances \
                          on its own over time."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "npc": {"type": "string", "description": "Name of the NPC"},
                    "goal": {"type": "string", "description": "The new goal"},
                },
                "required": ["npc", "goal"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_matches_dispatch_table() {
        let catalog = GmTools::all();
        assert_eq!(catalog.len(), GmTools::names().len());
        for spec in &catalog {
            // Every advertised tool must parse (with the right arguments).
            assert!(
                GmTools::names().contains(&spec.name.as_str()),
                "{} advertised but not dispatchable",
                spec.name
            );
            assert!(spec.parameters.get("type").is_some());
        }
    }

    #[test]
    fn test_parse_skill_check() {
        let call = parse_tool_call(
            "skill_check",
            &json!({"character": "Brannor", "skill": "athletics", "dc": 15, "advantage": "advantage"}),
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::SkillCheck {
                character: "Brannor".to_string(),
                skill: Skill::Athletics,
                dc: 15,
                advantage: Advantage::Advantage,
            }
        );
    }

    #[test]
    fn test_parse_unknown_tool() {
        let err = parse_tool_call("summon_meteor", &json!({})).unwrap_err();
        assert_eq!(err, ToolCallError::UnknownTool("summon_meteor".to_string()));
    }

    #[test]
    fn test_parse_missing_field() {
        let err = parse_tool_call("skill_check", &json!({"skill": "athletics"})).unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidArguments { .. }));
        assert!(err.to_string().contains("character"));
    }

    #[test]
    fn test_parse_null_arguments() {
        // Unparseable model output reaches us as Null; every tool with
        // required fields must reject it as invalid, not panic.
        let err = parse_tool_call("attack", &Value::Null).unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidArguments { .. }));
    }

    #[test]
    fn test_parse_bad_skill_name() {
        let err = parse_tool_call(
            "skill_check",
            &json!({"character": "Brannor", "skill": "juggling", "dc": 10}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unrecognized skill"));
    }

    #[test]
    fn test_parse_spell_level_bounds() {
        let err = parse_tool_call(
            "cast_spell",
            &json!({"character": "Mira", "spell": "wish", "spell_level": 10}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("0-9"));
    }

    #[test]
    fn test_parse_hp_change_rejects_zero_delta() {
        let err = parse_tool_call("apply_hp_change", &json!({"target": "Brannor", "delta": 0}))
            .unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn test_parse_start_encounter() {
        let call = parse_tool_call(
            "start_encounter",
            &json!({"enemies": [
                {"name": "Bandit", "max_hp": 11, "armor_class": 12, "dexterity": 12},
                {"name": "Wolf"}
            ]}),
        )
        .unwrap();
        let ToolCall::StartEncounter { enemies } = call else {
            panic!("wrong variant");
        };
        assert_eq!(enemies.len(), 2);
        assert_eq!(enemies[0].max_hp, Some(11));
        assert_eq!(enemies[1].max_hp, None);
    }

    #[test]
    fn test_parse_start_encounter_rejects_empty() {
        let err = parse_tool_call("start_encounter", &json!({"enemies": []})).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_parse_roll_dice_default_purpose() {
        let call = parse_tool_call("roll_dice", &json!({"notation": "2d6+3"})).unwrap();
        assert_eq!(
            call,
            ToolCall::RollDice {
                notation: "2d6+3".to_string(),
                purpose: "general roll".to_string(),
            }
        );
    }
}
