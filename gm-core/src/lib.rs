//! Mechanics-separated narrative turn engine.
//!
//! This crate provides:
//! - Cryptographically random dice and the rules resolvers (checks, saves,
//!   attacks, spellcasting, HP, initiative, passive detection, death saves,
//!   NPC goal drift)
//! - A turn orchestrator that mediates between a narrating language model
//!   and the rules engine over a bounded tool-calling protocol. The model
//!   can request mechanics but can never fabricate a roll, an HP value, or
//!   a spell slot
//! - A persistence gateway with per-turn snapshots and an append-only
//!   mechanics audit log
//! - Semantic long-term memory (embedding + cosine similarity retrieval)
//!   with a post-turn ingestion filter
//!
//! # Quick start
//!
//! ```ignore
//! use gm_core::{GameService, world::UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = GameService::from_env()?;
//!     let owner = UserId::new();
//!     let campaign = service.initialize_game_state(owner, "Emberfall").await?;
//!
//!     let response = service
//!         .interact(owner, campaign.id, "I search the cellar for anything odd")
//!         .await?;
//!     println!("{}", response.narration);
//!     Ok(())
//! }
//! ```

pub mod dice;
pub mod gm;
pub mod memory;
pub mod rules;
pub mod service;
pub mod store;
pub mod testing;
pub mod world;

// Primary public API
pub use gm::{ChatModel, GmConfig, GmError, LlmChatModel, Orchestrator, FALLBACK_NARRATION};
pub use memory::{Embedder, MemoryMetadata, MemoryRecord, MemoryStore, MemoryType};
pub use rules::{MechanicsDetail, MechanicsKind, MechanicsResult};
pub use service::{GameService, InteractResponse, ServiceError};
pub use store::{GameStore, StoreError};
pub use world::Snapshot;
