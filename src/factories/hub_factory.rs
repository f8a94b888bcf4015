use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::client::LifeHub;
use crate::config::Config;
use crate::error::{LifehubError, Result};
use crate::interfaces::providers::LlmProvider;
use crate::interfaces::storage::RecordStore;
use crate::providers::openai::{OpenAiProvider, DEFAULT_TIMEOUT_SECS};
use crate::providers::sqlite::SqliteRecordStore;
use crate::services::history::HistoryService;
use crate::services::summary::SummaryService;
use crate::services::tracker::TrackerService;

pub struct LifeHubFactory;

impl LifeHubFactory {
    pub async fn create_from_config(config: Config) -> Result<LifeHub> {
        let sqlite_path = config.sqlite_path();
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(&sqlite_path).await?);
        info!(path = %sqlite_path, "record store opened");
        let openai = Self::openai_from_config(&config)?.map(Arc::new);
        Ok(Self::assemble(config, store, openai))
    }

    /// Builds the model client when the config carries credentials. A custom
    /// `base_url` without a key is allowed for local OpenAI-compatible servers.
    pub fn openai_from_config(config: &Config) -> Result<Option<OpenAiProvider>> {
        let Some(openai) = config.openai.clone() else {
            return Ok(None);
        };
        let api_key = openai
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| openai.base_url.as_ref().map(|_| "local".to_string()));
        let Some(api_key) = api_key else {
            return Ok(None);
        };
        if openai.timeout_seconds == Some(0) {
            return Err(LifehubError::Config(
                "openai.timeout_seconds must be positive".to_string(),
            ));
        }
        let timeout = Duration::from_secs(openai.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Ok(Some(OpenAiProvider::with_timeout(
            api_key,
            openai.model,
            openai.base_url,
            timeout,
        )))
    }

    pub fn assemble(
        config: Config,
        store: Arc<dyn RecordStore>,
        openai: Option<Arc<OpenAiProvider>>,
    ) -> LifeHub {
        let llm = openai.clone().map(|p| p as Arc<dyn LlmProvider>);
        let mut hub = Self::assemble_with_llm(config, store, llm);
        hub.openai = openai;
        hub
    }

    /// Wires services around an arbitrary store and model. Used directly by
    /// tests and embedders that bring their own provider.
    pub fn assemble_with_llm(
        config: Config,
        store: Arc<dyn RecordStore>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> LifeHub {
        let offset = config.utc_offset();
        let history = Arc::new(
            HistoryService::new(Arc::clone(&store), offset)
                .with_default_limit(config.history_limit())
                .with_fetch_timeout(config.fetch_timeout()),
        );
        let tracker = TrackerService::new(Arc::clone(&store), offset);
        let summary = llm.as_ref().map(|llm| {
            SummaryService::new(Arc::clone(&history), Arc::clone(llm))
                .with_model(config.summary.as_ref().and_then(|s| s.model.clone()))
                .with_temperature(config.summary_temperature())
                .with_template(config.summary_template())
        });

        LifeHub {
            config,
            store,
            history,
            tracker,
            summary,
            llm,
            openai: None,
        }
    }
}
