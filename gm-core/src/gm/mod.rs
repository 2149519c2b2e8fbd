//! The AI game master: tool catalog and per-turn orchestration.

pub mod orchestrator;
pub mod tools;

pub use orchestrator::{
    ChatModel, GmConfig, GmError, LlmChatModel, Orchestrator, TurnOutcome, FALLBACK_NARRATION,
    MAX_TOOL_ROUNDS,
};
pub use tools::{parse_tool_call, EnemySpec, GmTools, ToolCall, ToolCallError};
