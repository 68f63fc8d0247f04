//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for tether
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host bridge RPC base URL
    pub bridge_url: Option<String>,
    /// Upstream chat-completions URL
    pub upstream_url: Option<String>,
    /// Operating mode ("Neutral Mode", "Project Mode", "Agent Mode")
    pub mode: Option<String>,
    /// File holding the mode prompt injected as the system message
    pub system_prompt_file: Option<String>,
    /// Usage tag stamped onto outgoing payloads
    pub usage_tag: Option<String>,
    /// Model-name override
    pub model_override: Option<String>,
    /// Page URL used for conversation-id extraction
    pub page_url: Option<String>,
    /// Overall exploration wait limit in seconds
    pub exploration_timeout_secs: Option<u64>,
    /// Indexing wait limit in seconds
    pub indexing_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tether")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for TETHER_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("TETHER_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        let dir = path.parent().unwrap();
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            bridge_url: Some("http://127.0.0.1:8765".to_string()),
            upstream_url: Some(
                "http://127.0.0.1:3000/api/chat/completions".to_string(),
            ),
            mode: Some("Agent Mode".to_string()),
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tether configuration file
# Place at ~/.config/tether/config.toml (Linux/Mac) or %APPDATA%\tether\config.toml (Windows)

# Host bridge RPC base URL (the embedding IDE process)
bridge_url = "http://127.0.0.1:8765"

# Upstream chat-completions endpoint
upstream_url = "http://127.0.0.1:3000/api/chat/completions"

# Operating mode: "Neutral Mode", "Project Mode", or "Agent Mode"
mode = "Agent Mode"

# File holding the mode prompt injected as the system message (optional)
# system_prompt_file = "~/.config/tether/agent_prompt.txt"

# Usage tag stamped onto outgoing payloads (optional)
# usage_tag = "ide_chat"

# Model-name override (optional)
# model_override = "gpt-4.1"

# Page URL used as the conversation-id source of last resort (optional)
# page_url = "http://127.0.0.1:3000/c/abc-123"

# Wait limits (optional)
# exploration_timeout_secs = 180
# indexing_timeout_secs = 300
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.bridge_url.as_deref(), Some("http://127.0.0.1:8765"));
        assert_eq!(config.mode.as_deref(), Some("Agent Mode"));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.bridge_url.is_none());
        assert!(config.exploration_timeout_secs.is_none());
    }
}
