//! Token estimation.
//!
//! The gateway never reports real token counts on the stream, so every count in
//! this crate is an approximation: `ceil(characters / 4)`. Treat the output as
//! an estimate, not as billing-grade ground truth.

use std::sync::Arc;

use crate::message::ChatMessage;

/// Characters per token used by the default estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate tokens for `text` as `ceil(chars / 4)`. Empty text is zero tokens.
pub fn estimate_tokens(text: &str) -> u32 {
    CharRatioEstimator::default().estimate(text)
}

/// Trait for token estimation implementations.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens in a plain text string.
    fn estimate(&self, text: &str) -> u32;

    /// Estimate the prompt cost of a message list (content only).
    fn estimate_messages(&self, messages: &[ChatMessage]) -> u32 {
        messages
            .iter()
            .map(|m| self.estimate(&m.content))
            .fold(0u32, |acc, x| acc.saturating_add(x))
    }
}

/// Character-ratio estimator. Counts Unicode scalar values, not bytes.
#[derive(Debug, Clone)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let chars = text.chars().count();
        let tokens = chars.div_ceil(self.chars_per_token);
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }
}

/// Arc-wrapped estimator for sharing across controllers.
pub type SharedEstimator = Arc<dyn TokenEstimator>;
