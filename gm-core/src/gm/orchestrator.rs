//! Per-turn orchestration.
//!
//! One turn is a strict sequence: advance the turn counter, build a
//! snapshot, run pre-narration checks, retrieve relevant memories, assemble
//! the prompt, run the bounded tool-call exchange with the model, and
//! finalize. The model only ever sees the snapshot and the structured tool
//! results; it can request mechanics but never decide them.

use crate::gm::tools::{parse_tool_call, EnemySpec, GmTools, ToolCall};
use crate::memory::{spawn_turn_ingestion, MemoryStore, TurnIngest};
use crate::rules::{self, InitiativeParticipant, MechanicsResult};
use crate::store::{GameStore, StoreError};
use crate::world::{Ability, CampaignId, GameMode, Snapshot};
use async_trait::async_trait;
use llm::{ChatMessage, ChatRequest, ChatResponse};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard cap on tool-call rounds within one turn. A round past the cap ends
/// the exchange with the fallback narration.
pub const MAX_TOOL_ROUNDS: usize = 10;

/// Narration used when the model never produced free text.
pub const FALLBACK_NARRATION: &str =
    "The Game Master shuffles their notes, resolving one roll after another, and the \
     scene settles. The dust clears on the outcomes above.";

/// NPC goals drift every this-many turns.
const GOAL_DRIFT_PERIOD: u64 = 3;

/// Errors that end a turn. Mechanics outcomes are never errors; these are
/// infrastructure failures only.
#[derive(Debug, Error)]
pub enum GmError {
    #[error("Model call failed: {0}")]
    Model(#[from] llm::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// The narrating model, behind a seam so tests can script it. The
/// production implementation is [`LlmChatModel`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, llm::Error>;
}

/// Production chat model over the OpenAI-compatible client.
pub struct LlmChatModel {
    client: llm::Client,
}

impl LlmChatModel {
    pub fn new(client: llm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatModel for LlmChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, llm::Error> {
        self.client.chat(request).await
    }
}

/// Tuning for the orchestrator.
#[derive(Debug, Clone)]
pub struct GmConfig {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    pub memory_top_k: usize,
    pub memory_threshold: f32,
}

impl Default for GmConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: Some(0.7),
            memory_top_k: 5,
            memory_threshold: 0.35,
        }
    }
}

/// Everything one turn produced.
pub struct TurnOutcome {
    pub narration: String,
    pub results: Vec<MechanicsResult>,
    pub turn_number: u64,
    pub mode: GameMode,
    pub in_game_time: String,
    /// Handle of the background memory-ingestion task. Dropping it
    /// detaches the task; tests can await it for determinism.
    pub ingestion: tokio::task::JoinHandle<()>,
}

/// The per-turn state machine.
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    config: GmConfig,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            config: GmConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GmConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one complete turn for a campaign. The caller must hold the
    /// campaign's turn lock: turns within a campaign are strictly
    /// sequential, while different campaigns may run concurrently.
    pub async fn run_turn(
        &self,
        store: &Arc<RwLock<GameStore>>,
        memory: &Arc<MemoryStore>,
        campaign_id: CampaignId,
        player_input: &str,
    ) -> Result<TurnOutcome, GmError> {
        // ADVANCE_TURN
        let turn = store.write().await.advance_turn(campaign_id)?;
        debug!(campaign = %campaign_id, turn, "turn started");

        // BUILD_SNAPSHOT + PRE_CHECKS, folded into a rebuilt snapshot
        let mut results = Vec::new();
        let snapshot = self
            .run_pre_checks(store, campaign_id, turn, &mut results)
            .await?;

        // MEMORY_RETRIEVAL: failures are swallowed, the turn just loses
        // its memory context.
        let memories = match memory
            .search(
                campaign_id,
                player_input,
                self.config.memory_top_k,
                self.config.memory_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "memory retrieval failed");
                Vec::new()
            }
        };

        // PROMPT_BUILD
        let system_prompt = build_system_prompt(
            &snapshot,
            &memories
                .iter()
                .map(|hit| (hit.record.memory_type, hit.record.summary.clone()))
                .collect::<Vec<_>>(),
        );

        // TOOL_LOOP
        let mut messages = vec![ChatMessage::user(player_input)];
        let mut rounds = 0usize;
        let narration = loop {
            let mut request = ChatRequest::new(messages.clone())
                .with_system(system_prompt.as_str())
                .with_max_tokens(self.config.max_tokens)
                .with_tools(GmTools::all());
            if let Some(ref model) = self.config.model {
                request = request.with_model(model.as_str());
            }
            if let Some(temperature) = self.config.temperature {
                request = request.with_temperature(temperature);
            }

            // A model failure here is terminal for the turn; the caller
            // retries the whole interaction.
            let response = self.model.chat(request).await?;

            if !response.has_tool_calls() {
                break response.text().to_string();
            }

            rounds += 1;
            messages.push(ChatMessage::Assistant {
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
            });

            for call in response.tool_calls {
                let content = match parse_tool_call(&call.name, &call.arguments) {
                    Ok(tool_call) => {
                        match self
                            .execute_tool(store, campaign_id, turn, tool_call)
                            .await?
                        {
                            Ok(executed) => {
                                let payload = serde_json::to_value(&executed)
                                    .unwrap_or_else(|_| json!([]));
                                results.extend(executed);
                                payload.to_string()
                            }
                            Err(message) => json!({ "error": message }).to_string(),
                        }
                    }
                    Err(e) => json!({ "error": e.to_string() }).to_string(),
                };
                messages.push(ChatMessage::tool_result(call.id, content));
            }

            if rounds > MAX_TOOL_ROUNDS {
                warn!(campaign = %campaign_id, turn, rounds, "tool loop cap exceeded");
                break FALLBACK_NARRATION.to_string();
            }
        };

        // FINALIZE
        let campaign = store.read().await.campaign(campaign_id)?.clone();
        let ingestion = spawn_turn_ingestion(
            Arc::clone(memory),
            TurnIngest {
                campaign_id,
                session: campaign.session_number,
                turn,
                player_input: player_input.to_string(),
                narration: narration.clone(),
                mechanics: results.clone(),
            },
        );

        Ok(TurnOutcome {
            narration,
            results,
            turn_number: turn,
            mode: campaign.mode,
            in_game_time: campaign.in_game_time,
            ingestion,
        })
    }

    /// Silent pre-narration checks: passive detection against the current
    /// location every turn, NPC goal drift every third turn. Everything is
    /// logged and folded into the snapshot handed to prompt assembly.
    async fn run_pre_checks(
        &self,
        store: &Arc<RwLock<GameStore>>,
        campaign_id: CampaignId,
        turn: u64,
        results: &mut Vec<MechanicsResult>,
    ) -> Result<Snapshot, GmError> {
        let mut store = store.write().await;
        let snapshot = store.build_snapshot(campaign_id, Vec::new())?;
        let mut new_discoveries = Vec::new();

        if let Some(ref location) = snapshot.location {
            for discovery in rules::passive_checks(&snapshot.party, location) {
                if let Some(object) =
                    store.mark_hidden_object_discovered(location.id, &discovery.object_name)?
                {
                    store.append_log(discovery.result.to_log_entry(campaign_id, turn));
                    results.push(discovery.result);
                    new_discoveries.push(object);
                }
            }
        }

        if turn % GOAL_DRIFT_PERIOD == 0 {
            for npc in store.active_npcs(campaign_id) {
                if npc.goal_complete() {
                    continue;
                }
                let drift = rules::npc_goal_drift(&npc);
                store.advance_npc_goal(npc.id, drift.new_progress)?;
                store.append_log(drift.result.to_log_entry(campaign_id, turn));
                results.push(drift.result);
            }
        }

        Ok(store.build_snapshot(campaign_id, new_discoveries)?)
    }

    /// Dispatch a validated tool call to its resolver and gateway writes.
    /// `Err` here is a structured, narratable problem (a missing actor,
    /// an unknown location) handed back to the model, never an exception.
    /// The outer `Result` carries real store failures.
    async fn execute_tool(
        &self,
        store: &Arc<RwLock<GameStore>>,
        campaign_id: CampaignId,
        turn: u64,
        call: ToolCall,
    ) -> Result<Result<Vec<MechanicsResult>, String>, StoreError> {
        let mut store = store.write().await;

        let executed = match call {
            ToolCall::SkillCheck {
                character,
                skill,
                dc,
                advantage,
            } => match store.find_character_by_name(campaign_id, &character) {
                Some(character) => Ok(vec![rules::skill_check(character, skill, dc, advantage)]),
                None => Err(no_such_character(&character)),
            },
            ToolCall::SavingThrow {
                character,
                ability,
                dc,
                advantage,
            } => match store.find_character_by_name(campaign_id, &character) {
                Some(character) => Ok(vec![rules::saving_throw(character, ability, dc, advantage)]),
                None => Err(no_such_character(&character)),
            },
            ToolCall::Attack {
                attacker,
                target,
                damage,
                advantage,
            } => self.resolve_attack(&store, campaign_id, &attacker, &target, damage, advantage),
            ToolCall::CastSpell {
                character,
                spell,
                spell_level,
            } => match store.find_character_by_name(campaign_id, &character) {
                Some(caster) => {
                    let caster_id = caster.id;
                    let outcome = rules::cast_spell(caster, &spell, spell_level);
                    if let Some(slots) = outcome.updated_slots {
                        store.apply_spell_slots(caster_id, slots)?;
                    }
                    Ok(vec![outcome.result])
                }
                None => Err(no_such_character(&character)),
            },
            ToolCall::HpChange { target, delta } => {
                if let Some(character) = store.find_character_by_name(campaign_id, &target) {
                    let character_id = character.id;
                    let outcome = rules::apply_hp_change(&target, character.hp, delta);
                    store.apply_hp(character_id, outcome.new_hp)?;
                    store.update_encounter_hp(campaign_id, &target, outcome.new_hp);
                    Ok(vec![outcome.result])
                } else if let Some(combatant) = store
                    .active_encounter(campaign_id)
                    .and_then(|e| {
                        e.combatants
                            .iter()
                            .find(|c| c.name.eq_ignore_ascii_case(&target))
                    })
                    .cloned()
                {
                    let hp = crate::world::HitPoints {
                        current: combatant.hp,
                        maximum: combatant.max_hp,
                    };
                    let outcome = rules::apply_hp_change(&combatant.name, hp, delta);
                    store.update_encounter_hp(campaign_id, &combatant.name, outcome.new_hp);
                    Ok(vec![outcome.result])
                } else {
                    Err(format!(
                        "No party member or active combatant named '{target}'"
                    ))
                }
            }
            ToolCall::StartEncounter { enemies } => {
                let mut participants: Vec<InitiativeParticipant> = store
                    .party(campaign_id)
                    .iter()
                    .map(|c| InitiativeParticipant {
                        id: c.id.0,
                        name: c.name.clone(),
                        dex_modifier: c.abilities.modifier(Ability::Dexterity),
                        is_player: true,
                        hp: c.hp.current,
                        max_hp: c.hp.maximum,
                        armor_class: c.armor_class,
                    })
                    .collect();
                for enemy in &enemies {
                    participants.push(enemy_participant(&store, campaign_id, enemy));
                }

                let outcome = rules::roll_initiative(&participants);
                let names: Vec<String> =
                    outcome.combatants.iter().map(|c| c.name.clone()).collect();
                store.start_encounter(campaign_id, outcome.combatants)?;
                Ok(vec![outcome.result, rules::encounter_started(names)])
            }
            ToolCall::EndEncounter => {
                if store.active_encounter(campaign_id).is_none() {
                    Err("No encounter is active".to_string())
                } else {
                    store.end_encounter(campaign_id)?;
                    Ok(vec![rules::encounter_ended()])
                }
            }
            ToolCall::RollDice { notation, purpose } => {
                Ok(vec![rules::roll_dice(&notation, &purpose)])
            }
            ToolCall::DeathSave { character } => {
                match store.find_character_by_name(campaign_id, &character) {
                    Some(dying) if dying.hp.current > 0 => {
                        Err(format!("{} is not at 0 HP and needs no death save", dying.name))
                    }
                    Some(dying) => {
                        let dying_id = dying.id;
                        let outcome = rules::death_save(dying);
                        store.apply_death_saves(dying_id, outcome.saves)?;
                        if outcome.recovered {
                            store.apply_hp(dying_id, 1)?;
                            store.update_encounter_hp(campaign_id, &character, 1);
                        }
                        Ok(vec![outcome.result])
                    }
                    None => Err(no_such_character(&character)),
                }
            }
            ToolCall::MoveLocation { location } => {
                match store.find_location_by_name(campaign_id, &location) {
                    Some(destination) => {
                        let destination_id = destination.id;
                        let destination_name = destination.name.clone();
                        let from = store
                            .campaign(campaign_id)?
                            .current_location
                            .and_then(|id| store.location(id).ok())
                            .map(|l| l.name.clone());
                        store.set_location(campaign_id, destination_id)?;
                        Ok(vec![rules::location_moved(from, destination_name)])
                    }
                    None => Err(format!("No known location named '{location}'")),
                }
            }
            ToolCall::AdjustDisposition { npc, delta } => {
                match store.find_npc_by_name(campaign_id, &npc).map(|n| n.id) {
                    Some(npc_id) => {
                        let new_disposition = store.adjust_npc_disposition(npc_id, delta)?;
                        Ok(vec![rules::disposition_shifted(&npc, delta, new_disposition)])
                    }
                    None => Err(no_such_npc(&npc)),
                }
            }
            ToolCall::UpdateNpcGoal { npc, goal } => {
                match store.find_npc_by_name(campaign_id, &npc).map(|n| n.id) {
                    Some(npc_id) => {
                        store.set_npc_goal(npc_id, &goal)?;
                        Ok(vec![rules::goal_updated(&npc, &goal)])
                    }
                    None => Err(no_such_npc(&npc)),
                }
            }
        };

        if let Ok(ref results) = executed {
            for result in results {
                store.append_log(result.to_log_entry(campaign_id, turn));
            }
        }

        Ok(executed)
    }

    /// Attack needs both sides resolved from state: the attacker's bonus
    /// and damage dice, and the target's armor class.
    fn resolve_attack(
        &self,
        store: &GameStore,
        campaign_id: CampaignId,
        attacker: &str,
        target: &str,
        damage: Option<String>,
        advantage: crate::dice::Advantage,
    ) -> Result<Vec<MechanicsResult>, String> {
        let (attack_bonus, damage_notation) =
            if let Some(character) = store.find_character_by_name(campaign_id, attacker) {
                let strength = character.abilities.modifier(Ability::Strength);
                let bonus = strength + character.proficiency_bonus();
                let notation = damage.unwrap_or_else(|| format!("1d6+{strength}"));
                (bonus, notation)
            } else if let Some(stats) = store
                .find_npc_by_name(campaign_id, attacker)
                .and_then(|n| n.combat_stats.as_ref())
            {
                (stats.attack_bonus, stats.damage_dice.clone())
            } else {
                return Err(format!("No combat-capable actor named '{attacker}'"));
            };

        let target_ac = if let Some(character) = store.find_character_by_name(campaign_id, target) {
            character.armor_class
        } else if let Some(stats) = store
            .find_npc_by_name(campaign_id, target)
            .and_then(|n| n.combat_stats.as_ref())
        {
            stats.armor_class
        } else if let Some(combatant) = store.active_encounter(campaign_id).and_then(|e| {
            e.combatants
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(target))
        }) {
            combatant.armor_class
        } else {
            return Err(format!("No combatant named '{target}' to attack"));
        };

        Ok(vec![rules::attack(
            attacker,
            attack_bonus,
            target,
            target_ac,
            &damage_notation,
            advantage,
        )])
    }
}

fn no_such_character(name: &str) -> String {
    format!("No party member named '{name}' in this campaign")
}

fn no_such_npc(name: &str) -> String {
    format!("No NPC named '{name}' in this campaign")
}

fn enemy_participant(
    store: &GameStore,
    campaign_id: CampaignId,
    enemy: &EnemySpec,
) -> InitiativeParticipant {
    if let Some(npc) = store.find_npc_by_name(campaign_id, &enemy.name) {
        if let Some(ref stats) = npc.combat_stats {
            return InitiativeParticipant {
                id: npc.id.0,
                name: npc.name.clone(),
                dex_modifier: stats.dexterity_modifier(),
                is_player: false,
                hp: stats.max_hp,
                max_hp: stats.max_hp,
                armor_class: stats.armor_class,
            };
        }
    }
    let max_hp = enemy.max_hp.unwrap_or(10).max(1);
    InitiativeParticipant {
        id: Uuid::new_v4(),
        name: enemy.name.clone(),
        dex_modifier: (enemy.dexterity.unwrap_or(10) as i32 - 10).div_euclid(2),
        is_player: false,
        hp: max_hp,
        max_hp,
        armor_class: enemy.armor_class.unwrap_or(10),
    }
}

/// Assemble the system prompt. Everything narratable comes from the
/// snapshot; hidden log entries, hidden-object DCs, and NPC goals stay
/// out.
fn build_system_prompt(
    snapshot: &Snapshot,
    memories: &[(crate::memory::MemoryType, String)],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/gm_base.txt"));
    prompt.push('\n');
    prompt.push_str(include_str!("prompts/mechanics.txt"));

    let campaign = &snapshot.campaign;
    prompt.push_str(&format!(
        "\n## Campaign: {}\nMode: {}\nIn-game time: {}\nTurn: {}\n",
        campaign.name, campaign.mode, campaign.in_game_time, campaign.turn_number
    ));

    prompt.push_str("\n## Party\n");
    if snapshot.party.is_empty() {
        prompt.push_str("(no party members registered)\n");
    }
    for member in &snapshot.party {
        prompt.push_str(&format!(
            "- {} (level {}): HP {}/{}, AC {}",
            member.name, member.level, member.hp.current, member.hp.maximum, member.armor_class
        ));
        let slots = member.spell_slots.as_table();
        if !slots.is_empty() {
            let mut levels: Vec<_> = slots.into_iter().collect();
            levels.sort();
            let slots: Vec<String> = levels
                .into_iter()
                .map(|(level, count)| format!("L{level}x{count}"))
                .collect();
            prompt.push_str(&format!(", spell slots {}", slots.join(" ")));
        }
        if member.death_saves.successes > 0 || member.death_saves.failures > 0 {
            prompt.push_str(&format!(
                ", death saves {}S/{}F",
                member.death_saves.successes, member.death_saves.failures
            ));
        }
        prompt.push('\n');
    }

    if let Some(ref location) = snapshot.location {
        prompt.push_str(&format!(
            "\n## Location: {}\n{}\n",
            location.name, location.description
        ));
        let known: Vec<&str> = location
            .hidden_objects
            .iter()
            .filter(|o| o.discovered)
            .map(|o| o.name.as_str())
            .collect();
        if !known.is_empty() {
            prompt.push_str(&format!("Already found here: {}\n", known.join(", ")));
        }
    }

    if !snapshot.new_discoveries.is_empty() {
        prompt.push_str("\n## Just noticed\n");
        prompt.push_str(
            "The party has just passively noticed the following. Weave each into the narration \
             as something they spot, without mentioning any mechanics:\n",
        );
        for object in &snapshot.new_discoveries {
            prompt.push_str(&format!("- {}\n", object.name));
        }
    }

    if !snapshot.npcs_present.is_empty() {
        prompt.push_str("\n## NPCs present\n");
        for npc in &snapshot.npcs_present {
            prompt.push_str(&format!(
                "- {} ({}), disposition {}\n",
                npc.name, npc.npc_type, npc.disposition
            ));
        }
    }

    if let Some(ref encounter) = snapshot.encounter {
        prompt.push_str(&format!("\n## Combat, round {}\n", encounter.round));
        for (i, combatant) in encounter.combatants.iter().enumerate() {
            let marker = if i == encounter.turn_index { ">" } else { " " };
            prompt.push_str(&format!(
                "{marker} {} (init {}): HP {}/{}, AC {}\n",
                combatant.name,
                combatant.initiative,
                combatant.hp,
                combatant.max_hp,
                combatant.armor_class
            ));
        }
    }

    let visible_log: Vec<&crate::world::MechanicsLogEntry> = snapshot
        .recent_log
        .iter()
        .filter(|entry| !entry.hidden)
        .collect();
    if !visible_log.is_empty() {
        prompt.push_str("\n## Recent mechanical events (newest first)\n");
        for entry in visible_log {
            prompt.push_str(&format!("- [turn {}] {}\n", entry.turn_number, entry.summary));
        }
    }

    if !memories.is_empty() {
        prompt.push_str("\n## Relevant history from earlier sessions\n");
        for (memory_type, summary) in memories {
            prompt.push_str(&format!("- ({memory_type:?}) {summary}\n"));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use crate::world::{
        CampaignState, CharacterState, HiddenObject, HiddenObjectType, UserId,
    };

    fn snapshot_with(
        party: Vec<CharacterState>,
        new_discoveries: Vec<HiddenObject>,
    ) -> Snapshot {
        Snapshot {
            campaign: CampaignState::new(CampaignId::new(), UserId::new(), "Emberfall"),
            party,
            location: None,
            npcs_present: vec![],
            encounter: None,
            recent_log: vec![],
            new_discoveries,
        }
    }

    #[test]
    fn test_prompt_contains_party_and_campaign() {
        let character = crate::testing::sample_fighter(CampaignId::new());
        let prompt = build_system_prompt(&snapshot_with(vec![character], vec![]), &[]);
        assert!(prompt.contains("Campaign: Emberfall"));
        assert!(prompt.contains("Brannor"));
        assert!(prompt.contains("HP 44/44"));
    }

    #[test]
    fn test_prompt_surfaces_new_discoveries_without_dc() {
        let discovery = HiddenObject {
            name: "scratched floor sigil".to_string(),
            dc: 13,
            object_type: HiddenObjectType::Clue,
            discovered: true,
        };
        let prompt = build_system_prompt(&snapshot_with(vec![], vec![discovery]), &[]);
        assert!(prompt.contains("scratched floor sigil"));
        assert!(!prompt.contains("13"), "DC must never reach the prompt");
    }

    #[test]
    fn test_prompt_excludes_hidden_log_entries() {
        let campaign_id = CampaignId::new();
        let mut snapshot = snapshot_with(vec![], vec![]);
        let visible = rules::roll_dice("1d6", "flavor").to_log_entry(campaign_id, 1);
        let npc = crate::testing::sample_npc(campaign_id, None);
        let hidden = rules::npc_goal_drift(&npc).result.to_log_entry(campaign_id, 1);
        snapshot.recent_log = vec![visible.clone(), hidden.clone()];

        let prompt = build_system_prompt(&snapshot, &[]);
        assert!(prompt.contains(&visible.summary));
        assert!(!prompt.contains(&hidden.summary));
    }

    #[test]
    fn test_prompt_includes_memory_section() {
        let prompt = build_system_prompt(
            &snapshot_with(vec![], vec![]),
            &[(
                MemoryType::Narration,
                "The party swore an oath to the ferryman".to_string(),
            )],
        );
        assert!(prompt.contains("Relevant history"));
        assert!(prompt.contains("ferryman"));
    }
}
