//! Testing utilities.
//!
//! - [`ScriptedChat`] stands in for the narrating model and returns queued
//!   tool-call rounds and narration, so the whole turn pipeline runs
//!   deterministically with no network.
//! - [`TestHarness`] wires a [`GameService`] with scripted providers and
//!   sample content.

use crate::gm::ChatModel;
use crate::memory::{Embedder, HashEmbedder, MemoryError};
use crate::service::{GameService, InteractResponse};
use crate::world::{
    AbilityScores, Ability, CampaignId, CharacterId, CharacterState, DeathSaves, HiddenObject,
    HiddenObjectType, HitPoints, Location, LocationId, Npc, NpcCombatStats, NpcId, Skill,
    SpellSlots, UserId,
};
use async_trait::async_trait;
use llm::{ChatRequest, ChatResponse, FinishReason, ToolCallRequest};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// The model requests these tool invocations.
    ToolCalls(Vec<(String, Value)>),
    /// The model replies with narration, ending the exchange.
    Narration(String),
    /// The model call fails at the transport level.
    Failure(String),
}

impl ScriptedTurn {
    /// A round with a single tool call.
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        ScriptedTurn::ToolCalls(vec![(name.into(), arguments)])
    }

    pub fn narration(text: impl Into<String>) -> Self {
        ScriptedTurn::Narration(text.into())
    }
}

/// A chat model that replays a script. Requests are recorded for
/// inspection.
pub struct ScriptedChat {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another response.
    pub fn queue(&self, turn: ScriptedTurn) {
        self.turns.lock().expect("script lock").push_back(turn);
    }

    /// Every request the orchestrator sent, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("request lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, llm::Error> {
        self.requests.lock().expect("request lock").push(request);
        let turn = self.turns.lock().expect("script lock").pop_front();
        match turn {
            None => Ok(ChatResponse {
                content: Some("The scene holds, waiting on the party.".to_string()),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
            }),
            Some(ScriptedTurn::Narration(text)) => Ok(ChatResponse {
                content: Some(text),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
            }),
            Some(ScriptedTurn::ToolCalls(calls)) => Ok(ChatResponse {
                content: None,
                tool_calls: calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, arguments))| ToolCallRequest {
                        id: format!("call_{i}"),
                        name,
                        arguments,
                    })
                    .collect(),
                finish_reason: FinishReason::ToolCalls,
            }),
            Some(ScriptedTurn::Failure(message)) => Err(llm::Error::Network(message)),
        }
    }
}

/// An embedder that always fails, for exercising degraded paths.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::Embedding("embedding service unavailable".to_string()))
    }
}

// ============================================================================
// Sample content
// ============================================================================

/// A level-5 fighter with a trained eye: passive perception 18.
pub fn sample_fighter(campaign_id: CampaignId) -> CharacterState {
    CharacterState {
        id: CharacterId::new(),
        campaign_id,
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
        equipment: vec!["longsword".to_string(), "shield".to_string()],
        features: vec!["second wind".to_string()],
        death_saves: DeathSaves::default(),
    }
}

/// A combat-capable rival NPC.
pub fn sample_npc(campaign_id: CampaignId, location: Option<LocationId>) -> Npc {
    Npc {
        id: NpcId::new(),
        campaign_id,
        name: "Vex".to_string(),
        disposition: -20,
        npc_type: "rival".to_string(),
        goal: "steal the ledger".to_string(),
        goal_progress: 0,
        combat_stats: Some(NpcCombatStats {
            max_hp: 22,
            armor_class: 13,
            dexterity: 14,
            attack_bonus: 4,
            damage_dice: "1d6+2".to_string(),
        }),
        location,
        active: true,
    }
}

/// A cellar with three hidden objects: one findable by the sample
/// fighter's passive perception, one requiring investigation, one out of
/// reach.
pub fn sample_cellar(campaign_id: CampaignId) -> Location {
    Location {
        id: LocationId::new(),
        campaign_id,
        name: "Old Cellar".to_string(),
        description: "A low-ceilinged cellar smelling of damp earth and old wine.".to_string(),
        hidden_objects: vec![
            HiddenObject {
                name: "loose coin".to_string(),
                dc: 12,
                object_type: HiddenObjectType::Item,
                discovered: false,
            },
            HiddenObject {
                name: "scratched sigil".to_string(),
                dc: 12,
                object_type: HiddenObjectType::Clue,
                discovered: false,
            },
            HiddenObject {
                name: "sealed vault seam".to_string(),
                dc: 20,
                object_type: HiddenObjectType::SecretDoor,
                discovered: false,
            },
        ],
        connections: vec![],
        visited: false,
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A service wired with scripted providers and sample content.
pub struct TestHarness {
    pub service: GameService,
    pub chat: Arc<ScriptedChat>,
    pub owner: UserId,
    pub campaign_id: CampaignId,
    pub location_id: LocationId,
    pub npc_id: NpcId,
}

impl TestHarness {
    /// Full harness: one fighter, the cellar as current location, one NPC
    /// present.
    pub async fn new() -> Self {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let service = GameService::new(
            Arc::clone(&chat) as Arc<dyn ChatModel>,
            Arc::new(HashEmbedder::default()),
        );
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Test Campaign")
            .await
            .expect("campaign");
        let campaign_id = campaign.id;

        service
            .register_character(owner, sample_fighter(campaign_id))
            .await
            .expect("character");

        let location = sample_cellar(campaign_id);
        let location_id = service
            .create_location(owner, location)
            .await
            .expect("location");
        service
            .set_current_location(owner, campaign_id, location_id)
            .await
            .expect("set location");

        let npc_id = service
            .create_npc(owner, sample_npc(campaign_id, Some(location_id)))
            .await
            .expect("npc");

        Self {
            service,
            chat,
            owner,
            campaign_id,
            location_id,
            npc_id,
        }
    }

    /// Minimal harness: a campaign with one fighter and nothing else, no
    /// location, no NPCs, so no pre-check results muddy assertions.
    pub async fn bare() -> Self {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let service = GameService::new(
            Arc::clone(&chat) as Arc<dyn ChatModel>,
            Arc::new(HashEmbedder::default()),
        );
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Test Campaign")
            .await
            .expect("campaign");
        let campaign_id = campaign.id;
        service
            .register_character(owner, sample_fighter(campaign_id))
            .await
            .expect("character");

        Self {
            service,
            chat,
            owner,
            campaign_id,
            location_id: LocationId::new(),
            npc_id: NpcId::new(),
        }
    }

    pub fn expect(&self, turn: ScriptedTurn) -> &Self {
        self.chat.queue(turn);
        self
    }

    pub fn expect_narration(&self, text: impl Into<String>) -> &Self {
        self.chat.queue(ScriptedTurn::narration(text));
        self
    }

    /// Send player input, panicking on turn failure.
    pub async fn input(&self, text: &str) -> InteractResponse {
        self.service
            .interact(self.owner, self.campaign_id, text)
            .await
            .expect("turn should succeed")
    }
}

/// Assert that a response carries a visible result of the given kind.
#[track_caller]
pub fn assert_visible_kind(response: &InteractResponse, kind: crate::rules::MechanicsKind) {
    assert!(
        response.visible_results.iter().any(|r| r.kind == kind),
        "expected a visible {kind:?} result, got {:?}",
        response
            .visible_results
            .iter()
            .map(|r| r.kind)
            .collect::<Vec<_>>()
    );
}

/// Assert that a response carries a hidden result of the given kind.
#[track_caller]
pub fn assert_hidden_kind(response: &InteractResponse, kind: crate::rules::MechanicsKind) {
    assert!(
        response.hidden_results.iter().any(|r| r.kind == kind),
        "expected a hidden {kind:?} result, got {:?}",
        response
            .hidden_results
            .iter()
            .map(|r| r.kind)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_chat_replays_in_order() {
        let chat = ScriptedChat::new(vec![
            ScriptedTurn::tool_call("roll_dice", serde_json::json!({"notation": "1d20"})),
            ScriptedTurn::narration("All quiet."),
        ]);

        let first = chat.chat(ChatRequest::new(vec![])).await.unwrap();
        assert!(first.has_tool_calls());
        assert_eq!(first.tool_calls[0].name, "roll_dice");

        let second = chat.chat(ChatRequest::new(vec![])).await.unwrap();
        assert!(!second.has_tool_calls());
        assert_eq!(second.text(), "All quiet.");

        // Script exhausted: a default narration keeps tests from hanging.
        let third = chat.chat(ChatRequest::new(vec![])).await.unwrap();
        assert!(!third.has_tool_calls());
        assert_eq!(chat.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure_surfaces_as_error() {
        let chat = ScriptedChat::new(vec![ScriptedTurn::Failure("timeout".to_string())]);
        assert!(chat.chat(ChatRequest::new(vec![])).await.is_err());
    }

    #[test]
    fn test_sample_fighter_passive_scores() {
        let fighter = sample_fighter(CampaignId::new());
        assert_eq!(fighter.passive_score(Skill::Perception), 18);
        assert_eq!(fighter.passive_score(Skill::Investigation), 10);
    }
}
