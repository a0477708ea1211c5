//! Persistence collaborator: two settings fields plus an append-only transcript.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::ChatMessage;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The two persisted settings: bearer credential and selected model.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn api_key(&self) -> Result<Option<String>>;

    async fn set_api_key(&self, api_key: Option<String>) -> Result<()>;

    async fn selected_model(&self) -> Result<Option<String>>;

    async fn set_selected_model(&self, model: String) -> Result<()>;
}

/// Session transcript. Messages are only ever appended, or cleared wholesale.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, messages: &[ChatMessage]) -> Result<()>;

    async fn messages(&self) -> Result<Vec<ChatMessage>>;

    async fn clear(&self) -> Result<()>;
}
