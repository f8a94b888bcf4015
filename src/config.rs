use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use time::UtcOffset;

use crate::error::{LifehubError, Result};
use crate::local_time::tz_offset_from_minutes;
use crate::services::chat::DEFAULT_CHAT_PERSONA;
use crate::services::history::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_HISTORY_LIMIT};
use crate::services::summary::{DEFAULT_SUMMARY_TEMPERATURE, DEFAULT_SUMMARY_TEMPLATE};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryConfig {
    pub default_limit: Option<usize>,
    pub fetch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SummaryConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Instruction text wrapped around the activity log; `{activity_log}`
    /// marks where the log goes.
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatConfig {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub storage: Option<StorageConfig>,
    pub history: Option<HistoryConfig>,
    pub summary: Option<SummaryConfig>,
    pub chat: Option<ChatConfig>,
    pub timezone_offset_minutes: Option<i32>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| LifehubError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| LifehubError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Fills a missing `openai.api_key` from `OPENAI_API_KEY`.
    pub fn resolve_env(mut self) -> Self {
        let missing = self
            .openai
            .as_ref()
            .and_then(|o| o.api_key.as_deref())
            .map_or(true, |key| key.trim().is_empty());
        if missing {
            if let Ok(key) = std::env::var(OPENAI_API_KEY_ENV) {
                if !key.trim().is_empty() {
                    self.openai.get_or_insert_with(OpenAiConfig::default).api_key = Some(key);
                }
            }
        }
        self
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai
            .as_ref()
            .and_then(|o| o.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn sqlite_path(&self) -> String {
        self.storage
            .as_ref()
            .and_then(|s| s.sqlite_path.clone())
            .unwrap_or_else(crate::providers::sqlite::default_db_path)
    }

    pub fn history_limit(&self) -> usize {
        self.history
            .as_ref()
            .and_then(|h| h.default_limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.history
                .as_ref()
                .and_then(|h| h.fetch_timeout_seconds)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        )
    }

    pub fn utc_offset(&self) -> UtcOffset {
        tz_offset_from_minutes(self.timezone_offset_minutes.unwrap_or(0))
    }

    pub fn summary_template(&self) -> &str {
        self.summary
            .as_ref()
            .and_then(|s| s.template.as_deref())
            .unwrap_or(DEFAULT_SUMMARY_TEMPLATE)
    }

    pub fn summary_temperature(&self) -> f32 {
        self.summary
            .as_ref()
            .and_then(|s| s.temperature)
            .unwrap_or(DEFAULT_SUMMARY_TEMPERATURE)
    }

    pub fn chat_persona(&self) -> &str {
        self.chat
            .as_ref()
            .and_then(|c| c.system_prompt.as_deref())
            .unwrap_or(DEFAULT_CHAT_PERSONA)
    }
}
