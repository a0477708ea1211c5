//! localai-core - domain types and token accounting for the LocalAI+ chat client
//!
//! - `message` - chat roles, messages, tool calls and requests
//! - `budget` - token estimation, usage accumulation, context-window levels
//! - `persona` - built-in system-prompt presets
//! - `config` - file and environment configuration
//! - `store` - settings and transcript persistence

pub mod budget;
pub mod config;
pub mod message;
pub mod paths;
pub mod persona;
pub mod store;

pub use budget::{
    estimate_tokens, ContextLevel, ContextWindow, SessionTokens, TokenEstimator, TokenUsage,
    UsageAccumulator,
};
pub use config::Config;
pub use message::{ChatMessage, ChatRequest, FunctionCall, Role, ToolCall};
pub use persona::{Persona, PERSONAS};
pub use store::{FileStore, MemoryStore, SettingsStore, StoreError, TranscriptStore};
