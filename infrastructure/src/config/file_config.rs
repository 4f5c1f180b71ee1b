//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Logging settings
    pub log: FileLogConfig,
    /// Local model backend settings (`[local_model]` section)
    pub local_model: FileLocalModelConfig,
    /// Remote streaming backend settings (`[openai]` section)
    pub openai: FileOpenAiConfig,
    /// API key encryption settings
    pub secrets: FileSecretsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Log filter overriding the `-v` flags (e.g. "debug").
    pub level: Option<String>,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLocalModelConfig {
    /// The backend is only registered when enabled.
    pub enabled: bool,
    /// WebSocket endpoint of the local inference service.
    pub url: String,
}

impl Default for FileLocalModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "ws://localhost:5001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOpenAiConfig {
    /// The backend is only registered when enabled.
    pub enabled: bool,
    /// Base URL of the chat-completions API.
    pub base_url: String,
    /// Number of concurrent streaming requests.
    pub pool_size: usize,
}

impl Default for FileOpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com".to_string(),
            pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSecretsConfig {
    /// Base64-encoded 32-byte key sealing stored chat API keys.
    /// Without it, keys are stored as provided.
    pub api_key_enc_key: Option<String>,
    /// Envelope key id, for future key rotation.
    pub api_key_id: Option<String>,
}
