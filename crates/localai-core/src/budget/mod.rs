//! Token budget accounting for chat turns.
//!
//! - [`estimator`]: `ceil(chars / 4)` token estimates
//! - [`usage`]: per-stream [`TokenUsage`]
//! - [`accumulator`]: running completion estimate and the shared session total
//! - [`context`]: context-window pressure levels

pub mod accumulator;
pub mod context;
pub mod estimator;
pub mod usage;

pub use accumulator::{SessionTokens, UsageAccumulator};
pub use context::{ContextLevel, ContextWindow, DEFAULT_CONTEXT_LIMIT};
pub use estimator::{estimate_tokens, CharRatioEstimator, SharedEstimator, TokenEstimator};
pub use usage::TokenUsage;
