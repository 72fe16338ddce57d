//! Configuration management
//!
//! Manages workbench configuration: endpoint URLs, chat defaults and the
//! conversation store location. Loaded from `config.toml` in the platform
//! config directory, with environment variable overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External endpoint URLs
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Chat completion defaults
    #[serde(default)]
    pub chat: ChatConfig,
    /// Audio behavior defaults
    #[serde(default)]
    pub audio: AudioSettings,
    /// Conversation store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// External endpoint URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Base URL of the OpenAI-compatible model server (LM Studio et al.)
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    /// Base URL of the TTS service
    #[serde(default = "default_tts_base_url")]
    pub tts_base_url: String,
    /// Base URL of the PDF export service
    #[serde(default = "default_export_base_url")]
    pub export_base_url: String,
}

fn default_llm_base_url() -> String {
    "http://localhost:1234".to_string()
}

fn default_tts_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_export_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            llm_base_url: default_llm_base_url(),
            tts_base_url: default_tts_base_url(),
            export_base_url: default_export_base_url(),
        }
    }
}

/// Chat completion defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default persona role for new panels
    #[serde(default = "default_role")]
    pub default_role: String,
    /// Default persona posture for new panels
    #[serde(default = "default_posture")]
    pub default_posture: String,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_role() -> String {
    crate::persona::DEFAULT_ROLE.to_string()
}

fn default_posture() -> String {
    crate::persona::DEFAULT_POSTURE.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            default_role: default_role(),
            default_posture: default_posture(),
        }
    }
}

/// Audio behavior defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Read streamed responses aloud without user action
    #[serde(default = "default_auto_read")]
    pub auto_read: bool,
    /// Start muted
    #[serde(default)]
    pub muted: bool,
}

fn default_auto_read() -> bool {
    true
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            auto_read: default_auto_read(),
            muted: false,
        }
    }
}

/// Conversation store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cochat")
        .join("conversations.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    /// Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Path to the user config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cochat")
            .join("config.toml")
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("COCHAT_LLM_URL") {
            self.endpoints.llm_base_url = url;
        }
        if let Ok(url) = std::env::var("COCHAT_TTS_URL") {
            self.endpoints.tts_base_url = url;
        }
        if let Ok(url) = std::env::var("COCHAT_EXPORT_URL") {
            self.endpoints.export_base_url = url;
        }
        if let Ok(path) = std::env::var("COCHAT_DB_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
    }

    /// Save the current configuration to the config file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
