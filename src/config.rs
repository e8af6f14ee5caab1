use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn config_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("homebutler")
        .join("config.toml")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheduler loop tick interval in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_tick_secs() -> u64 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// "openai" (any OpenAI-compatible endpoint) | "anthropic"
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// Override for OpenAI-compatible gateways (vLLM etc.).
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_platform() -> String {
    "openai".to_string()
}

fn default_agent_name() -> String {
    "Butler".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            api_key: String::new(),
            model: String::new(),
            base_url: String::new(),
            agent_name: default_agent_name(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    /// Environment fills gaps the config file left open; PORT always wins.
    fn apply_env(&mut self) {
        if self.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.api_key = key;
            }
        }
        if self.base_url.is_empty() {
            if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
                self.base_url = url;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Effective model name based on platform defaults
    pub fn effective_model(&self) -> &str {
        if !self.model.is_empty() {
            return &self.model;
        }
        match self.platform.as_str() {
            "anthropic" => "claude-haiku-4-5",
            _ => "gpt-4o-mini",
        }
    }

    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        "https://api.openai.com/v1"
    }
}
