use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Result, SettingsStore, TranscriptStore};
use crate::message::ChatMessage;

#[derive(Debug, Default)]
struct MemoryState {
    api_key: Option<String>,
    selected_model: Option<String>,
    transcript: Vec<ChatMessage>,
}

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(api_key: Option<String>, selected_model: Option<String>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                api_key,
                selected_model,
                transcript: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn api_key(&self) -> Result<Option<String>> {
        Ok(self.state.read().await.api_key.clone())
    }

    async fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        self.state.write().await.api_key = api_key;
        Ok(())
    }

    async fn selected_model(&self) -> Result<Option<String>> {
        Ok(self.state.read().await.selected_model.clone())
    }

    async fn set_selected_model(&self, model: String) -> Result<()> {
        self.state.write().await.selected_model = Some(model);
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn append(&self, messages: &[ChatMessage]) -> Result<()> {
        self.state
            .write()
            .await
            .transcript
            .extend(messages.iter().cloned());
        Ok(())
    }

    async fn messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.state.read().await.transcript.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.state.write().await.transcript.clear();
        Ok(())
    }
}
