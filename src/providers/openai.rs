// OpenAI-compatible chat completions provider
//
// Works for OpenRouter (default) and OpenAI since both speak
// POST {base}/v1/chat/completions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{ProviderRequest, ProviderResponse};
use super::LlmProvider;
use crate::config::constants::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STAGE_MODEL, OPENAI_BASE_URL, OPENROUTER_BASE_URL,
};

/// OpenAI-compatible provider
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    provider_name: String,
}

impl OpenAIProvider {
    /// Create an OpenRouter provider
    pub fn new_openrouter(api_key: String) -> Result<Self> {
        Self::new(
            api_key,
            OPENROUTER_BASE_URL.to_string(),
            DEFAULT_STAGE_MODEL.to_string(),
            "openrouter".to_string(),
        )
    }

    /// Create an OpenAI provider
    pub fn new_openai(api_key: String) -> Result<Self> {
        Self::new(
            api_key,
            OPENAI_BASE_URL.to_string(),
            "gpt-4o-mini".to_string(),
            "openai".to_string(),
        )
    }

    /// Set custom model for this provider
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Point at a different host (gateways, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the HTTP client with one using a different transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    fn new(
        api_key: String,
        base_url: String,
        default_model: String,
        provider_name: String,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))?,
            api_key,
            base_url,
            default_model,
            provider_name,
        })
    }

    /// Convert ProviderRequest to the wire format
    fn to_chat_request(&self, request: &ProviderRequest) -> ChatRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: Some(m.content.clone()),
        }));

        ChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
        }
    }

    fn from_chat_response(&self, response: ChatResponse) -> Result<ProviderResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .with_context(|| format!("{} returned no choices in response", self.provider_name))?;

        Ok(ProviderResponse {
            id: response.id,
            model: response.model,
            text: choice.message.content.unwrap_or_default(),
            stop_reason: choice.finish_reason,
            provider: self.provider_name.clone(),
        })
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let chat_request = self.to_chat_request(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        tracing::debug!(
            "Sending request to {} (model: {}, {} messages)",
            self.provider_name,
            chat_request.model,
            chat_request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&chat_request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.provider_name))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} API request failed\n\nStatus: {}\nBody: {}",
                self.provider_name,
                status,
                error_body
            );
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} API response", self.provider_name))?;

        self.from_chat_response(chat_response)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}
