//! Semantic long-term memory.
//!
//! Textual events are embedded into fixed-dimension vectors and ranked by
//! cosine similarity at retrieval time, with a small boost for records the
//! table marked important. The ingestion filter decides post-turn what is
//! worth remembering so storage and embedding cost stay bounded.

use crate::rules::{MechanicsDetail, MechanicsKind, MechanicsResult};
use crate::world::CampaignId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Similarity added per point of importance boost.
const BOOST_WEIGHT: f32 = 0.02;

/// Longest stored summary, in characters.
const SUMMARY_CHARS: usize = 200;

/// Player input shorter than this is a command, not a memory.
const SUBSTANTIVE_INPUT_CHARS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Memory not found: {0}")]
    NotFound(MemoryId),
}

/// What a memory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Narration,
    PlayerAction,
    Mechanics,
    Note,
}

/// Source linkage and ranking hints attached at ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub session: Option<u32>,
    pub turn: Option<u64>,
    pub importance_boost: i32,
    pub tags: Vec<String>,
}

/// A stored memory. Never mutated after creation except for the
/// importance boost, and deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub campaign_id: CampaignId,
    pub content: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub memory_type: MemoryType,
    pub session: Option<u32>,
    pub turn: Option<u64>,
    pub importance_boost: i32,
    pub tags: Vec<String>,
}

/// A ranked retrieval hit.
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub record: MemoryRecord,
    /// Cosine similarity plus importance boost, capped at 1.0.
    pub score: f32,
}

/// Text-to-vector provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Production embedder over the OpenAI-compatible client.
pub struct LlmEmbedder {
    client: llm::Client,
}

impl LlmEmbedder {
    pub fn new(client: llm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.client
            .embed(text)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))
    }
}

/// Deterministic bag-of-words embedder for tests and offline use.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dim];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % self.dim as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Cosine similarity between two vectors; 0.0 for mismatched or zero-norm
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Similarity plus the importance boost, capped at 1.0.
pub fn adjusted_score(similarity: f32, importance_boost: i32) -> f32 {
    (similarity + importance_boost as f32 * BOOST_WEIGHT).min(1.0)
}

/// Embedding-backed memory store, campaign-scoped.
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<HashMap<CampaignId, Vec<MemoryRecord>>>,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Embed `content` and persist it with a truncated summary and its
    /// source linkage.
    pub async fn embed_and_store(
        &self,
        campaign_id: CampaignId,
        content: &str,
        memory_type: MemoryType,
        metadata: MemoryMetadata,
    ) -> Result<MemoryId, MemoryError> {
        let embedding = self.embedder.embed(content).await?;
        let record = MemoryRecord {
            id: MemoryId::new(),
            campaign_id,
            content: content.to_string(),
            summary: truncate_chars(content, SUMMARY_CHARS),
            embedding,
            memory_type,
            session: metadata.session,
            turn: metadata.turn,
            importance_boost: metadata.importance_boost,
            tags: metadata.tags,
        };
        let id = record.id;
        self.records
            .write()
            .await
            .entry(campaign_id)
            .or_default()
            .push(record);
        Ok(id)
    }

    /// Embed the query and rank the campaign's memories by adjusted cosine
    /// similarity, dropping everything under `threshold` and keeping the
    /// best `top_k`.
    pub async fn search(
        &self,
        campaign_id: CampaignId,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MemorySearchResult>, MemoryError> {
        let query_embedding = self.embedder.embed(query).await?;
        let records = self.records.read().await;
        let mut hits: Vec<MemorySearchResult> = records
            .get(&campaign_id)
            .map(|records| {
                records
                    .iter()
                    .map(|record| MemorySearchResult {
                        score: adjusted_score(
                            cosine_similarity(&query_embedding, &record.embedding),
                            record.importance_boost,
                        ),
                        record: record.clone(),
                    })
                    .filter(|hit| hit.score >= threshold)
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    pub async fn delete(&self, campaign_id: CampaignId, id: MemoryId) -> Result<(), MemoryError> {
        let mut records = self.records.write().await;
        let campaign_records = records.get_mut(&campaign_id).ok_or(MemoryError::NotFound(id))?;
        let before = campaign_records.len();
        campaign_records.retain(|r| r.id != id);
        if campaign_records.len() == before {
            return Err(MemoryError::NotFound(id));
        }
        Ok(())
    }

    pub async fn set_importance(
        &self,
        campaign_id: CampaignId,
        id: MemoryId,
        importance_boost: i32,
    ) -> Result<(), MemoryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&campaign_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or(MemoryError::NotFound(id))?;
        record.importance_boost = importance_boost;
        Ok(())
    }

    /// The most recent `limit` memories, newest first.
    pub async fn list(&self, campaign_id: CampaignId, limit: usize) -> Vec<MemoryRecord> {
        self.records
            .read()
            .await
            .get(&campaign_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, campaign_id: CampaignId) -> usize {
        self.records
            .read()
            .await
            .get(&campaign_id)
            .map_or(0, |records| records.len())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

// ============================================================================
// Ingestion filter
// ============================================================================

/// Player input worth remembering: longer than a bare command.
pub fn is_substantive_input(input: &str) -> bool {
    input.trim().chars().count() >= SUBSTANTIVE_INPUT_CHARS
}

/// Mechanics worth remembering: the events that shape the story rather
/// than every roll: criticals, kills, natural 20s and 1s, spell casts,
/// combat boundaries, and travel.
pub fn should_embed_mechanics(result: &MechanicsResult) -> bool {
    match result.kind {
        MechanicsKind::SpellCast
        | MechanicsKind::EncounterStart
        | MechanicsKind::EncounterEnd
        | MechanicsKind::LocationMove => true,
        MechanicsKind::Attack => matches!(
            &result.detail,
            MechanicsDetail::Attack { roll, critical, .. } if *critical || roll.is_natural_1()
        ),
        MechanicsKind::SkillCheck => matches!(
            &result.detail,
            MechanicsDetail::SkillCheck { roll, .. } if roll.is_natural_20() || roll.is_natural_1()
        ),
        MechanicsKind::SavingThrow => matches!(
            &result.detail,
            MechanicsDetail::SavingThrow { roll, .. } if roll.is_natural_20() || roll.is_natural_1()
        ),
        MechanicsKind::HpChange => matches!(
            &result.detail,
            MechanicsDetail::HpChange { dead, .. } if *dead
        ),
        MechanicsKind::DeathSave => matches!(
            &result.detail,
            MechanicsDetail::DeathSave { roll, dead, recovered, .. }
                if *dead || *recovered || *roll == 20 || *roll == 1
        ),
        MechanicsKind::Initiative
        | MechanicsKind::PassiveCheck
        | MechanicsKind::GoalDrift
        | MechanicsKind::DiceRoll
        | MechanicsKind::DispositionShift
        | MechanicsKind::GoalUpdate => false,
    }
}

/// Everything one completed turn offers the memory subsystem.
#[derive(Debug, Clone)]
pub struct TurnIngest {
    pub campaign_id: CampaignId,
    pub session: u32,
    pub turn: u64,
    pub player_input: String,
    pub narration: String,
    pub mechanics: Vec<MechanicsResult>,
}

impl TurnIngest {
    /// Apply the ingestion filter, yielding `(content, type)` pairs.
    fn items(&self) -> Vec<(String, MemoryType)> {
        let mut items = Vec::new();
        if is_substantive_input(&self.player_input) {
            items.push((self.player_input.clone(), MemoryType::PlayerAction));
        }
        if !self.narration.trim().is_empty() {
            items.push((self.narration.clone(), MemoryType::Narration));
        }
        for result in self.mechanics.iter().filter(|r| should_embed_mechanics(r)) {
            items.push((result.summary.clone(), MemoryType::Mechanics));
        }
        items
    }
}

/// Embed a completed turn in the background. Decoupled from the
/// player-visible response: failures are logged and otherwise ignored, and
/// no lock is held across the turn path.
pub fn spawn_turn_ingestion(
    memory: Arc<MemoryStore>,
    ingest: TurnIngest,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let metadata = MemoryMetadata {
            session: Some(ingest.session),
            turn: Some(ingest.turn),
            importance_boost: 0,
            tags: Vec::new(),
        };
        let stores = ingest.items().into_iter().map(|(content, memory_type)| {
            let memory = Arc::clone(&memory);
            let metadata = metadata.clone();
            async move {
                memory
                    .embed_and_store(ingest.campaign_id, &content, memory_type, metadata)
                    .await
            }
        });
        for result in futures::future::join_all(stores).await {
            if let Err(e) = result {
                warn!(campaign = %ingest.campaign_id, turn = ingest.turn, error = %e, "memory ingestion failed");
            }
        }
    })
}
