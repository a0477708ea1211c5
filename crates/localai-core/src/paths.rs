use std::path::PathBuf;

/// The LocalAI+ data directory (`~/.localai`).
pub fn localai_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".localai")
}

/// `~/.localai/config.json`
pub fn config_json_path() -> PathBuf {
    localai_dir().join("config.json")
}

/// Directory holding `settings.json` and the transcript.
pub fn store_dir() -> PathBuf {
    localai_dir().join("store")
}

