//! Per-request and session-wide token accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::context::{ContextLevel, ContextWindow};
use super::estimator::{CharRatioEstimator, SharedEstimator, TokenEstimator};
use super::usage::TokenUsage;
use crate::message::ChatMessage;

/// Session-cumulative token total.
///
/// Cloning shares the counter, so several controllers (one per chat view) can
/// fold into the same total. Increments are atomic; the value only moves down
/// through [`SessionTokens::reset`].
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    total: Arc<AtomicU64>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(total: u64) -> Self {
        Self {
            total: Arc::new(AtomicU64::new(total)),
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Fold `tokens` into the total and return the new total.
    pub fn add(&self, tokens: u64) -> u64 {
        self.total.fetch_add(tokens, Ordering::SeqCst) + tokens
    }

    /// Start a new session. Only the transcript owner should call this.
    pub fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
    }

    pub fn context_level(&self, window: &ContextWindow) -> ContextLevel {
        window.classify(self.total())
    }
}

/// Running completion estimate for one in-flight stream.
///
/// [`UsageAccumulator::finalize`] consumes the accumulator, so a stream can be
/// folded into the session total at most once.
pub struct UsageAccumulator {
    session: SessionTokens,
    estimator: SharedEstimator,
    completion_tokens: u32,
}

impl UsageAccumulator {
    pub fn new(session: SessionTokens) -> Self {
        Self::with_estimator(session, Arc::new(CharRatioEstimator::default()))
    }

    pub fn with_estimator(session: SessionTokens, estimator: SharedEstimator) -> Self {
        Self {
            session,
            estimator,
            completion_tokens: 0,
        }
    }

    /// Add the estimate for one delta; returns the running completion total.
    pub fn on_delta(&mut self, text: &str) -> u32 {
        let tokens = self.estimator.estimate(text);
        self.completion_tokens = self.completion_tokens.saturating_add(tokens);
        self.completion_tokens
    }

    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    /// Close out the stream.
    ///
    /// Prompt tokens are re-estimated from every message in the request rather
    /// than reusing per-message counts, since earlier counts may be stale.
    pub fn finalize(self, prompt_messages: &[ChatMessage]) -> TokenUsage {
        let prompt_tokens = self.estimator.estimate_messages(prompt_messages);
        let usage = TokenUsage::new(prompt_tokens, self.completion_tokens);
        let session_total = self.session.add(u64::from(usage.total_tokens));

        log::debug!(
            "Finalized usage: prompt={} completion={} total={} session={}",
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
            session_total
        );

        usage
    }
}
