use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{Result, SettingsStore, TranscriptStore};
use crate::message::ChatMessage;

const SETTINGS_FILE: &str = "settings.json";
const TRANSCRIPT_FILE: &str = "transcript.jsonl";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_model: Option<String>,
}

/// File-backed store: `settings.json` plus a JSONL transcript.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    fn settings_path(&self) -> PathBuf {
        self.base_path.join(SETTINGS_FILE)
    }

    fn transcript_path(&self) -> PathBuf {
        self.base_path.join(TRANSCRIPT_FILE)
    }

    async fn read_settings(&self) -> Result<PersistedSettings> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(PersistedSettings::default());
        }
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn update_settings<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut PersistedSettings) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.read_settings().await?;
        update(&mut settings);
        let json = serde_json::to_string_pretty(&settings)?;
        fs::write(self.settings_path(), json).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn api_key(&self) -> Result<Option<String>> {
        Ok(self.read_settings().await?.api_key)
    }

    async fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        self.update_settings(|s| s.api_key = api_key).await
    }

    async fn selected_model(&self) -> Result<Option<String>> {
        Ok(self.read_settings().await?.selected_model)
    }

    async fn set_selected_model(&self, model: String) -> Result<()> {
        self.update_settings(|s| s.selected_model = Some(model)).await
    }
}

#[async_trait]
impl TranscriptStore for FileStore {
    async fn append(&self, messages: &[ChatMessage]) -> Result<()> {
        let mut buf = Vec::new();
        for message in messages {
            serde_json::to_writer(&mut buf, message)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path())
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    async fn messages(&self) -> Result<Vec<ChatMessage>> {
        let path = self.transcript_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut messages = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(message) => messages.push(message),
                Err(e) => log::warn!("Skipping unreadable transcript line: {}", e),
            }
        }

        Ok(messages)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.transcript_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
