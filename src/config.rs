use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const APP_DIR: &str = "rss-digest-notifier";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Hours a stored article lives before the purge sweep may drop it.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,

    #[serde(default = "default_stale_days")]
    pub feed_stale_days: i64,

    #[serde(default = "default_stale_days")]
    pub entry_stale_days: i64,

    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,

    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    #[serde(default = "default_change_batch_size")]
    pub change_batch_size: usize,

    #[serde(default)]
    pub tagging: TaggingStrategy,

    /// Category -> synonyms for the keyword classifier. Empty means built-in.
    #[serde(default)]
    pub taxonomy: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub notifiers: BTreeMap<String, NotifierConfig>,

    #[serde(default)]
    pub summarizers: BTreeMap<String, SummarizerProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub id: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Feed category name -> feed URL.
    pub rss_url: BTreeMap<String, String>,
    pub webhook_secret_ref: String,
    #[serde(default)]
    pub destination: Destination,
    pub summarizer_name: String,
    #[serde(default)]
    pub show_tags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummarizerProfile {
    pub output_language: String,
    pub persona: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    Slack,
    Teams,
    Discord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggingStrategy {
    None,
    #[default]
    Model,
    Keywords,
    Both,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("articles.db").to_string_lossy().to_string()
}

fn default_retention_hours() -> i64 {
    72
}

fn default_stale_days() -> i64 {
    7
}

fn default_dispatch_delay_ms() -> u64 {
    500
}

fn default_max_content_chars() -> usize {
    12_000
}

fn default_change_batch_size() -> usize {
    100
}

fn default_model_id() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            api_url: default_api_url(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_hours: default_retention_hours(),
            feed_stale_days: default_stale_days(),
            entry_stale_days: default_stale_days(),
            dispatch_delay_ms: default_dispatch_delay_ms(),
            max_content_chars: default_max_content_chars(),
            change_batch_size: default_change_batch_size(),
            tagging: TaggingStrategy::default(),
            taxonomy: BTreeMap::new(),
            model: ModelConfig::default(),
            notifiers: BTreeMap::new(),
            summarizers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the default location, writing a
    /// default file there on first run.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let config_path = Self::config_path();
                if config_path.exists() {
                    Self::from_file(&config_path)?
                } else {
                    let config = Config::default();
                    config.save(&config_path)?;
                    config
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        for (name, notifier) in &self.notifiers {
            if !self.summarizers.contains_key(&notifier.summarizer_name) {
                return Err(AppError::Config(format!(
                    "notifier '{}' references unknown summarizer '{}'",
                    name, notifier.summarizer_name
                )));
            }
        }
        if self.retention_hours <= 0 {
            return Err(AppError::Config("retention_hours must be positive".into()));
        }
        if self.change_batch_size == 0 {
            return Err(AppError::Config("change_batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn notifier(&self, name: &str) -> Result<&NotifierConfig> {
        self.notifiers
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown notifier '{}'", name)))
    }

    pub fn summarizer(&self, name: &str) -> Result<&SummarizerProfile> {
        self.summarizers
            .get(name)
            .ok_or_else(|| AppError::Config(format!("unknown summarizer '{}'", name)))
    }

    pub fn api_key(&self) -> Option<String> {
        self.model
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}
