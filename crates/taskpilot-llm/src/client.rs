//! LLM client trait and the HTTP implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::message::{ChatMessage, ChatRequest, ToolDefinition};

/// LLM errors.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Chat-completion client trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion and return the assistant message.
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, LlmError>;

    /// Convenience wrapper for the plain system + user exchange.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let message = self
            .chat(ChatRequest::prompt(system, user).with_temperature(temperature))
            .await?;
        Ok(message.content_or_empty().to_string())
    }
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, LlmError> {
        (**self).chat(request).await
    }
}

/// HTTP client config (OpenAI-compatible).
#[derive(Debug, Clone)]
pub struct HttpLlmClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for HttpLlmClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            timeout_secs: 120,
        }
    }
}

/// HTTP LLM client using an OpenAI-compatible chat-completions API.
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: HttpLlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmClientConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| LlmError::Http(e.to_string()))?,
            );
        }

        let body = ApiChatRequest {
            model: request
                .model
                .unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages,
            temperature: request.temperature,
            tools: request.tools,
        };
        debug!(
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            "chat completion request"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Response(format!("HTTP {}: {}", status, text)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let parsed: ApiChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Serialization(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Response("Missing choices".to_string()))
    }
}

/// Scripted client for tests: returns queued messages in order.
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<ChatMessage>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<ChatMessage>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Script of plain assistant replies.
    pub fn from_texts(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(ChatMessage::assistant).collect())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatMessage, LlmError> {
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Response("scripted client exhausted".to_string()))
    }
}
