use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::budget::DEFAULT_CONTEXT_LIMIT;
use crate::paths::config_json_path;
use crate::persona::DEFAULT_PERSONA;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_MODEL: &str = "llama-3.2-1b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_MAX_RETRIES: u32 = 1;

const CONFIG_FILE_PATH: &str = "localai.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub persona: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_limit: u32,
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            persona: Some(DEFAULT_PERSONA.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            context_limit: DEFAULT_CONTEXT_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    /// Load from `~/.localai/config.json`, else `./localai.toml`, else defaults,
    /// then apply `LOCALAI_*` environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// File stage of [`Config::load`], without environment overrides.
    ///
    /// The first file that exists decides; if it cannot be read or parsed the
    /// result is the defaults.
    pub fn load_from(json_path: &Path, toml_path: &Path) -> Self {
        if json_path.exists() {
            match std::fs::read_to_string(json_path) {
                Ok(content) => match serde_json::from_str::<Config>(&content) {
                    Ok(config) => {
                        log::debug!("Loaded config from {}", json_path.display());
                        return config;
                    }
                    Err(e) => log::warn!("Failed to parse {}: {}", json_path.display(), e),
                },
                Err(e) => log::warn!("Failed to read {}: {}", json_path.display(), e),
            }
            return Self::default();
        }

        if toml_path.exists() {
            match std::fs::read_to_string(toml_path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        log::debug!("Loaded config from {}", toml_path.display());
                        return config;
                    }
                    Err(e) => log::warn!("Failed to parse {}: {}", toml_path.display(), e),
                },
                Err(e) => log::warn!("Failed to read {}: {}", toml_path.display(), e),
            }
        }

        Self::default()
    }

    /// Apply `LOCALAI_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("LOCALAI_API_URL") {
            self.api_base = api_base;
        }
        if let Some(api_key) = lookup("LOCALAI_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(model) = lookup("LOCALAI_MODEL") {
            self.model = model;
        }
        if let Some(persona) = lookup("LOCALAI_PERSONA") {
            self.persona = Some(persona);
        }
        if let Some(limit) = lookup("LOCALAI_CONTEXT_LIMIT") {
            match limit.trim().parse::<u32>() {
                Ok(limit) => self.context_limit = limit,
                Err(e) => log::warn!("Ignoring LOCALAI_CONTEXT_LIMIT={:?}: {}", limit, e),
            }
        }
    }
}
