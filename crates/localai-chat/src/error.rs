use localai_core::StoreError;
use localai_llm::{FailureKind, LLMError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("A turn is already in flight")]
    Busy,

    #[error(transparent)]
    Transport(#[from] LLMError),

    #[error("Stream closed before completion ({} chars received)", .partial.chars().count())]
    IncompleteStream { partial: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Connectivity vs. server-reported, for transport failures only.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ChatError::Transport(e) => Some(e.kind()),
            ChatError::IncompleteStream { .. } => Some(FailureKind::Connectivity),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Transport(e) => e.is_retryable(),
            ChatError::IncompleteStream { .. } => true,
            _ => false,
        }
    }

    /// Whether the end user should see a notice for this failure.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ChatError::Transport(_) | ChatError::IncompleteStream { .. }
        )
    }
}
