//! Context-window pressure classification.

use serde::{Deserialize, Serialize};

/// Default context window when neither config nor the model registry knows better.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 8192;

/// Percentage above which the window is in `Warning`.
pub const WARNING_PERCENT: u64 = 75;
/// Percentage above which the window is in `Critical`.
pub const CRITICAL_PERCENT: u64 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    Normal,
    Warning,
    Critical,
}

impl ContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextLevel::Normal => "normal",
            ContextLevel::Warning => "warning",
            ContextLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextWindow {
    pub limit: u32,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

impl ContextWindow {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    /// `100 * used / limit`, for display only.
    pub fn percentage(&self, used: u64) -> f64 {
        if self.limit == 0 {
            return if used == 0 { 0.0 } else { f64::INFINITY };
        }
        used as f64 * 100.0 / f64::from(self.limit)
    }

    /// Classify `used` tokens against the window.
    ///
    /// Boundaries are inclusive on the lower level: exactly 75% is `Normal`,
    /// exactly 90% is `Warning`. Compared in integer space so the edges are exact.
    pub fn classify(&self, used: u64) -> ContextLevel {
        let scaled = u128::from(used) * 100;
        let limit = u128::from(self.limit);

        if scaled > limit * u128::from(CRITICAL_PERCENT) {
            ContextLevel::Critical
        } else if scaled > limit * u128::from(WARNING_PERCENT) {
            ContextLevel::Warning
        } else {
            ContextLevel::Normal
        }
    }

    /// Tokens left before the window is full.
    pub fn remaining(&self, used: u64) -> u64 {
        u64::from(self.limit).saturating_sub(used)
    }
}
