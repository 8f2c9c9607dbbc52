// Request/response types for text-generation providers
//
// Plain-text chat messages: every stage sends one system prompt and one user
// message and reads back one block of text.

use serde::{Deserialize, Serialize};

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Provider-agnostic request
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,

    /// Model name; empty means the provider's default
    pub model: String,

    pub max_tokens: u32,

    /// Sent as a leading {"role":"system"} message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ProviderRequest {
    /// Create a new request from messages
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: String::new(),
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            system: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Provider-agnostic response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub model: String,
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Provider name that produced this response
    pub provider: String,
}
