//! The engine's public operation surface.
//!
//! [`GameService`] is what a thin API or CLI layer talks to: it owns the
//! gateway, the memory subsystem, and the orchestrator, enforces ownership
//! and input validation, and serializes turn processing per campaign while
//! letting independent campaigns run concurrently.

use crate::gm::{ChatModel, GmConfig, GmError, LlmChatModel, Orchestrator};
use crate::memory::{
    Embedder, LlmEmbedder, MemoryError, MemoryId, MemoryMetadata, MemoryRecord, MemorySearchResult,
    MemoryStore, MemoryType,
};
use crate::rules::MechanicsResult;
use crate::store::{GameStore, StoreError};
use crate::world::{
    CampaignId, CampaignState, CharacterState, GameMode, Location, LocationId, MechanicsLogEntry,
    Npc, NpcId, Snapshot, UserId,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Access denied to campaign {0}")]
    AccessDenied(CampaignId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gm(#[from] GmError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// The result of one player interaction.
#[derive(Debug)]
pub struct InteractResponse {
    pub narration: String,
    /// Mechanics the player may see.
    pub visible_results: Vec<MechanicsResult>,
    /// Silent mechanics (passive checks, goal drift) for auditing clients.
    pub hidden_results: Vec<MechanicsResult>,
    pub turn_number: u64,
    pub mode: GameMode,
    pub in_game_time: String,
}

/// The engine facade.
pub struct GameService {
    store: Arc<RwLock<GameStore>>,
    memory: Arc<MemoryStore>,
    orchestrator: Orchestrator,
    turn_locks: Mutex<HashMap<CampaignId, Arc<Mutex<()>>>>,
}

impl GameService {
    /// Build a service over explicit providers. Tests pass scripted ones.
    pub fn new(model: Arc<dyn ChatModel>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store: Arc::new(RwLock::new(GameStore::new())),
            memory: Arc::new(MemoryStore::new(embedder)),
            orchestrator: Orchestrator::new(model),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a production service from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, llm::Error> {
        let client = llm::Client::from_env()?;
        Ok(Self::new(
            Arc::new(LlmChatModel::new(client.clone())),
            Arc::new(LlmEmbedder::new(client)),
        ))
    }

    pub fn with_config(mut self, config: GmConfig) -> Self {
        self.orchestrator = self.orchestrator.with_config(config);
        self
    }

    /// Reject callers that do not own the campaign.
    async fn authorize(&self, user: UserId, campaign_id: CampaignId) -> Result<(), ServiceError> {
        let store = self.store.read().await;
        let campaign = store.campaign(campaign_id)?;
        if campaign.owner != user {
            return Err(ServiceError::AccessDenied(campaign_id));
        }
        Ok(())
    }

    /// One turn lock per campaign: turns are strictly sequential within a
    /// campaign, concurrent across campaigns.
    async fn turn_lock(&self, campaign_id: CampaignId) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Play
    // ------------------------------------------------------------------

    /// Process one free-text player action and return the narration plus
    /// every mechanical outcome of the turn.
    pub async fn interact(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        player_input: &str,
    ) -> Result<InteractResponse, ServiceError> {
        if player_input.trim().is_empty() {
            return Err(ServiceError::Validation(
                "player input must not be empty".to_string(),
            ));
        }
        self.authorize(user, campaign_id).await?;

        let lock = self.turn_lock(campaign_id).await;
        let _turn_guard = lock.lock().await;

        let outcome = self
            .orchestrator
            .run_turn(&self.store, &self.memory, campaign_id, player_input)
            .await?;

        let (hidden_results, visible_results): (Vec<_>, Vec<_>) =
            outcome.results.into_iter().partition(|r| r.hidden);

        Ok(InteractResponse {
            narration: outcome.narration,
            visible_results,
            hidden_results,
            turn_number: outcome.turn_number,
            mode: outcome.mode,
            in_game_time: outcome.in_game_time,
        })
    }

    /// The current snapshot, for state displays.
    pub async fn get_game_state(
        &self,
        user: UserId,
        campaign_id: CampaignId,
    ) -> Result<Snapshot, ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self
            .store
            .read()
            .await
            .build_snapshot(campaign_id, Vec::new())?)
    }

    /// The most recent audit entries, newest first.
    pub async fn get_mechanics_log(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        limit: usize,
    ) -> Result<Vec<MechanicsLogEntry>, ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self.store.read().await.recent_log(campaign_id, limit))
    }

    // ------------------------------------------------------------------
    // Authoring
    // ------------------------------------------------------------------

    /// Create a fresh campaign owned by `owner`.
    pub async fn initialize_game_state(
        &self,
        owner: UserId,
        campaign_name: &str,
    ) -> Result<CampaignState, ServiceError> {
        if campaign_name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "campaign name must not be empty".to_string(),
            ));
        }
        let id = CampaignId::new();
        let mut store = self.store.write().await;
        Ok(store.ensure_campaign(id, owner, campaign_name).clone())
    }

    /// Intake a party member from the character store collaborator.
    pub async fn register_character(
        &self,
        user: UserId,
        character: CharacterState,
    ) -> Result<(), ServiceError> {
        self.authorize(user, character.campaign_id).await?;
        if character.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "character name must not be empty".to_string(),
            ));
        }
        if character.hp.maximum <= 0 || !(0..=character.hp.maximum).contains(&character.hp.current)
        {
            return Err(ServiceError::Validation(format!(
                "character HP {}/{} is out of range",
                character.hp.current, character.hp.maximum
            )));
        }
        self.store.write().await.upsert_character(character);
        Ok(())
    }

    pub async fn create_npc(&self, user: UserId, npc: Npc) -> Result<NpcId, ServiceError> {
        self.authorize(user, npc.campaign_id).await?;
        if npc.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "NPC name must not be empty".to_string(),
            ));
        }
        if !(-100..=100).contains(&npc.disposition) {
            return Err(ServiceError::Validation(format!(
                "NPC disposition {} is out of range [-100, 100]",
                npc.disposition
            )));
        }
        if npc.goal_progress > 100 {
            return Err(ServiceError::Validation(
                "NPC goal progress exceeds 100".to_string(),
            ));
        }
        let id = npc.id;
        self.store.write().await.upsert_npc(npc);
        Ok(id)
    }

    pub async fn create_location(
        &self,
        user: UserId,
        location: Location,
    ) -> Result<LocationId, ServiceError> {
        self.authorize(user, location.campaign_id).await?;
        if location.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "location name must not be empty".to_string(),
            ));
        }
        if let Some(object) = location.hidden_objects.iter().find(|o| o.dc <= 0) {
            return Err(ServiceError::Validation(format!(
                "hidden object '{}' has a non-positive DC",
                object.name
            )));
        }
        let id = location.id;
        self.store.write().await.upsert_location(location);
        Ok(id)
    }

    /// Place the party at a location (authoring; travel during play goes
    /// through the `move_location` tool).
    pub async fn set_current_location(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        location_id: LocationId,
    ) -> Result<(), ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self
            .store
            .write()
            .await
            .set_location(campaign_id, location_id)?)
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    pub async fn search_memories(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MemorySearchResult>, ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self
            .memory
            .search(campaign_id, query, top_k, threshold)
            .await?)
    }

    pub async fn add_memory(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        content: &str,
        memory_type: MemoryType,
        metadata: MemoryMetadata,
    ) -> Result<MemoryId, ServiceError> {
        self.authorize(user, campaign_id).await?;
        if content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "memory content must not be empty".to_string(),
            ));
        }
        Ok(self
            .memory
            .embed_and_store(campaign_id, content, memory_type, metadata)
            .await?)
    }

    pub async fn delete_memory(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        id: MemoryId,
    ) -> Result<(), ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self.memory.delete(campaign_id, id).await?)
    }

    pub async fn update_memory_importance(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        id: MemoryId,
        importance_boost: i32,
    ) -> Result<(), ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self
            .memory
            .set_importance(campaign_id, id, importance_boost)
            .await?)
    }

    pub async fn get_memories(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self.memory.list(campaign_id, limit).await)
    }

    pub async fn get_memory_count(
        &self,
        user: UserId,
        campaign_id: CampaignId,
    ) -> Result<usize, ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self.memory.count(campaign_id).await)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub async fn save_campaign(
        &self,
        user: UserId,
        campaign_id: CampaignId,
        path: impl AsRef<Path>,
    ) -> Result<(), ServiceError> {
        self.authorize(user, campaign_id).await?;
        Ok(self
            .store
            .read()
            .await
            .save_campaign_json(campaign_id, path)
            .await?)
    }

    pub async fn load_campaign(&self, path: impl AsRef<Path>) -> Result<CampaignId, ServiceError> {
        Ok(self.store.write().await.load_campaign_json(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_fighter, sample_npc, ScriptedChat};
    use crate::memory::HashEmbedder;

    fn service() -> GameService {
        GameService::new(
            Arc::new(ScriptedChat::new(vec![])),
            Arc::new(HashEmbedder::default()),
        )
    }

    #[tokio::test]
    async fn test_initialize_creates_owned_campaign() {
        let service = service();
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();
        assert_eq!(campaign.owner, owner);
        assert_eq!(campaign.turn_number, 0);

        let snapshot = service.get_game_state(owner, campaign.id).await.unwrap();
        assert_eq!(snapshot.campaign.name, "Emberfall");
    }

    #[tokio::test]
    async fn test_foreign_user_is_rejected() {
        let service = service();
        let owner = UserId::new();
        let stranger = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();

        assert!(matches!(
            service.get_game_state(stranger, campaign.id).await,
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(matches!(
            service.interact(stranger, campaign.id, "I wave").await,
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(matches!(
            service.get_memory_count(stranger, campaign.id).await,
            Err(ServiceError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_store_error() {
        let service = service();
        assert!(matches!(
            service.get_game_state(UserId::new(), CampaignId::new()).await,
            Err(ServiceError::Store(StoreError::CampaignNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_input_is_validation_error() {
        let service = service();
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();
        assert!(matches!(
            service.interact(owner, campaign.id, "   ").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_npc_validates_disposition() {
        let service = service();
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();

        let mut npc = sample_npc(campaign.id, None);
        npc.disposition = 400;
        assert!(matches!(
            service.create_npc(owner, npc).await,
            Err(ServiceError::Validation(_))
        ));

        let npc = sample_npc(campaign.id, None);
        assert!(service.create_npc(owner, npc).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_character_validates_hp() {
        let service = service();
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();

        let mut character = sample_fighter(campaign.id);
        character.hp.current = character.hp.maximum + 5;
        assert!(matches!(
            service.register_character(owner, character).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_crud_round_trip() {
        let service = service();
        let owner = UserId::new();
        let campaign = service
            .initialize_game_state(owner, "Emberfall")
            .await
            .unwrap();

        let id = service
            .add_memory(
                owner,
                campaign.id,
                "The ferryman demands a silver coin",
                MemoryType::Note,
                MemoryMetadata::default(),
            )
            .await
            .unwrap();
        assert_eq!(service.get_memory_count(owner, campaign.id).await.unwrap(), 1);

        service
            .update_memory_importance(owner, campaign.id, id, 4)
            .await
            .unwrap();
        let memories = service.get_memories(owner, campaign.id, 10).await.unwrap();
        assert_eq!(memories[0].importance_boost, 4);

        let hits = service
            .search_memories(owner, campaign.id, "ferryman silver coin", 5, 0.1)
            .await
            .unwrap();
        assert!(!hits.is_empty());

        service.delete_memory(owner, campaign.id, id).await.unwrap();
        assert_eq!(service.get_memory_count(owner, campaign.id).await.unwrap(), 0);
    }
}
