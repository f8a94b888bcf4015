use std::sync::Arc;

use serde_json::json;
use time::UtcOffset;
use tracing::info;

use crate::domains::history::HistoryEvent;
use crate::domains::records::{DailySummary, Table};
use crate::domains::user::UserContext;
use crate::error::Result;
use crate::interfaces::providers::{ChatCompletionRequest, ChatMessage, LlmProvider};
use crate::interfaces::storage::{RecordStore, RowQuery};
use crate::local_time::{format_date, format_hhmm, local_date, now_ts};
use crate::services::history::HistoryService;

pub const ACTIVITY_LOG_PLACEHOLDER: &str = "{activity_log}";
pub const DEFAULT_SUMMARY_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_SUMMARY_TEMPLATE: &str = "You are a personal AI life narrator.
Here is the user's entire activity log for today (from midnight to now):
{activity_log}

INSTRUCTIONS:
1. Look at mood (journal), diet (meals) and productivity (tasks and sessions).
2. Write a short, witty, blog-style daily recap of at most 3-4 sentences.
TONE: casual, supportive but honest. Emojis are welcome.";

/// One `- [HH:MM] TYPE: content (secondary)` line per event, in the order given.
/// `None` means there is nothing to summarize.
pub fn build_activity_log(events: &[HistoryEvent], offset: UtcOffset) -> Option<String> {
    if events.is_empty() {
        return None;
    }
    let lines: Vec<String> = events
        .iter()
        .map(|event| {
            let mut line = format!(
                "- [{}] {}: {}",
                format_hhmm(event.timestamp, offset),
                event.event_type.as_str().to_uppercase(),
                event.content
            );
            if let Some(secondary) = event.secondary_info.as_deref().filter(|s| !s.is_empty()) {
                line.push_str(&format!(" ({secondary})"));
            }
            line
        })
        .collect();
    Some(lines.join("\n"))
}

/// Substitutes the log into the template. A template without the placeholder
/// gets the log appended.
pub fn render_prompt(template: &str, activity_log: &str) -> String {
    if template.contains(ACTIVITY_LOG_PLACEHOLDER) {
        template.replace(ACTIVITY_LOG_PLACEHOLDER, activity_log)
    } else {
        format!("{template}\n\n{activity_log}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    NothingToSummarize,
    Generated(DailySummary),
}

pub struct SummaryService {
    history: Arc<HistoryService>,
    llm: Arc<dyn LlmProvider>,
    model: Option<String>,
    temperature: f32,
    template: String,
}

impl SummaryService {
    pub fn new(history: Arc<HistoryService>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            history,
            llm,
            model: None,
            temperature: DEFAULT_SUMMARY_TEMPERATURE,
            template: DEFAULT_SUMMARY_TEMPLATE.to_string(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn store(&self) -> &Arc<dyn RecordStore> {
        self.history.store()
    }

    pub async fn generate_daily(&self, ctx: &UserContext) -> Result<SummaryOutcome> {
        self.generate_daily_at(ctx, now_ts()).await
    }

    pub async fn generate_daily_at(&self, ctx: &UserContext, now: i64) -> Result<SummaryOutcome> {
        let user_id = ctx.require()?;
        let offset = self.history.offset();

        let mut events = self.history.today_at(ctx, now).await?;
        events.reverse();
        let Some(activity_log) = build_activity_log(&events, offset) else {
            info!(user_id, "no activity today, skipping summary");
            return Ok(SummaryOutcome::NothingToSummarize);
        };

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(render_prompt(&self.template, &activity_log))],
            temperature: Some(self.temperature),
        };
        let content = self.llm.complete(request).await?;

        let date = format_date(local_date(now, offset));
        let stored = self
            .store()
            .insert(
                Table::DailySummaries,
                user_id,
                json!({ "content": content, "date": date, "created_at": now }),
            )
            .await?;
        info!(user_id, events = events.len(), "daily summary generated");
        Ok(SummaryOutcome::Generated(DailySummary::from_row(&stored)))
    }

    pub async fn latest_for_today(&self, ctx: &UserContext) -> Result<Option<DailySummary>> {
        self.latest_for_today_at(ctx, now_ts()).await
    }

    pub async fn latest_for_today_at(
        &self,
        ctx: &UserContext,
        now: i64,
    ) -> Result<Option<DailySummary>> {
        let user_id = ctx.require()?;
        let date = format_date(local_date(now, self.history.offset()));
        let query = RowQuery::for_user(user_id)
            .eq("date", date)
            .order_desc("created_at")
            .order_desc("id")
            .limit(1);
        let rows = self.store().select(Table::DailySummaries, query).await?;
        Ok(rows.first().map(DailySummary::from_row))
    }
}
