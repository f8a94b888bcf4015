use std::sync::Arc;

use tracing::warn;

use crate::error::{LifehubError, Result};
use crate::interfaces::providers::{ChatCompletionRequest, ChatMessage, LlmProvider};

pub const DEFAULT_CHAT_PERSONA: &str =
    "You are the assistant for a personal life-tracking hub. Be concise, technical, and helpful.";

/// A running conversation. The persona is sent first on every turn.
pub struct ChatSession {
    llm: Arc<dyn LlmProvider>,
    model: Option<String>,
    system_prompt: String,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            model: None,
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub async fn send(&mut self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LifehubError::Runtime("message is empty".to_string()));
        }
        self.messages.push(ChatMessage::user(text));

        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(self.messages.iter().cloned());
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: None,
        };

        match self.llm.complete(request).await {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(err) => {
                warn!(error = %err, "chat turn failed");
                self.messages.pop();
                Err(err)
            }
        }
    }
}
