use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LifehubError, Result};
use crate::interfaces::providers::{ChatCompletionRequest, ChatCompletionResponse, LlmProvider};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Chat-completions client. Errors keep the upstream status and body so the
/// daemon proxy can hand them back untouched.
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self::with_timeout(
            api_key,
            model,
            base_url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            api_key,
            model,
            base_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_transport(&self, err: reqwest::Error) -> LifehubError {
        if err.is_timeout() {
            LifehubError::Timeout {
                operation: "chat completion".to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            LifehubError::Http(err.to_string())
        }
    }

    /// Posts `body` as-is, filling `model` when absent, and returns the
    /// upstream status and raw body. Only transport failures are errors.
    pub async fn forward(&self, mut body: Value) -> Result<(u16, Bytes)> {
        if let Value::Object(map) = &mut body {
            let missing = map.get("model").map_or(true, |m| {
                m.is_null() || m.as_str().is_some_and(|s| s.trim().is_empty())
            });
            if missing {
                map.insert("model".to_string(), Value::String(self.model.clone()));
            }
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;
        debug!(status, len = bytes.len(), "forwarded chat completion");
        Ok((status, bytes))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, mut request: ChatCompletionRequest) -> Result<String> {
        if request.model.as_deref().map_or(true, str::is_empty) {
            request.model = Some(self.model.clone());
        }
        let body = serde_json::to_value(&request)
            .map_err(|e| LifehubError::Serialization(e.to_string()))?;
        let (status, bytes) = self.forward(body).await?;

        if !(200..300).contains(&status) {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            warn!(status, "chat completion failed upstream");
            return Err(LifehubError::Upstream { status, message });
        }

        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| LifehubError::Serialization(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LifehubError::Runtime("No choices returned".to_string()))?
            .message
            .content
            .unwrap_or_default();
        Ok(content)
    }
}
