use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::domains::history::HistoryEvent;
use crate::domains::user::UserContext;
use crate::error::{LifehubError, Result};
use crate::factories::hub_factory::LifeHubFactory;
use crate::interfaces::providers::LlmProvider;
use crate::interfaces::storage::RecordStore;
use crate::providers::openai::OpenAiProvider;
use crate::services::chat::ChatSession;
use crate::services::history::{HistoryQuery, HistoryService};
use crate::services::live::LiveFeed;
use crate::services::summary::SummaryService;
use crate::services::tracker::TrackerService;

/// Entry point bundling the store, the history aggregator and the
/// record/summary services for one configuration.
pub struct LifeHub {
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) history: Arc<HistoryService>,
    pub(crate) tracker: TrackerService,
    pub(crate) summary: Option<SummaryService>,
    pub(crate) llm: Option<Arc<dyn LlmProvider>>,
    pub(crate) openai: Option<Arc<OpenAiProvider>>,
}

impl LifeHub {
    pub async fn from_config(config: Config) -> Result<Self> {
        LifeHubFactory::create_from_config(config).await
    }

    pub async fn from_config_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::from_file(path)?.resolve_env();
        Self::from_config(config).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<HistoryService> {
        &self.history
    }

    pub fn tracker(&self) -> &TrackerService {
        &self.tracker
    }

    pub fn openai(&self) -> Option<&Arc<OpenAiProvider>> {
        self.openai.as_ref()
    }

    pub fn summary(&self) -> Result<&SummaryService> {
        self.summary.as_ref().ok_or_else(missing_model)
    }

    pub async fn recent_history(
        &self,
        ctx: &UserContext,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEvent>> {
        self.history
            .recent(ctx, HistoryQuery { limit, since: None })
            .await
    }

    pub async fn live_feed(&self, ctx: UserContext, limit: Option<usize>) -> Result<LiveFeed> {
        LiveFeed::mount(
            Arc::clone(&self.history),
            ctx,
            HistoryQuery { limit, since: None },
        )
        .await
    }

    pub fn chat_session(&self) -> Result<ChatSession> {
        let llm = self.llm.clone().ok_or_else(missing_model)?;
        let model = self.config.chat.as_ref().and_then(|c| c.model.clone());
        Ok(ChatSession::new(llm, self.config.chat_persona()).with_model(model))
    }
}

fn missing_model() -> LifehubError {
    LifehubError::Config("Missing OpenAI API key".to_string())
}
