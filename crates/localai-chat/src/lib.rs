//! localai-chat - one chat session against the LocalAI+ gateway
//!
//! [`ChatController`] drives a turn from prompt to committed transcript
//! entry: it builds the request, pulls decoded events, forwards deltas to
//! the chunk sink and folds usage into the shared session total.

pub mod controller;
pub mod error;
pub mod stream;
pub mod tool_calls;

pub use controller::{ChatController, ChatOptions, ChunkSink, TurnOutcome, TurnState, UsageSink};
pub use error::ChatError;
pub use tool_calls::ToolCallAccumulator;
