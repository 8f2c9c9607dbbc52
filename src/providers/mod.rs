// Text-generation provider support
//
// Every stage and the reviewer talk to the model through `LlmProvider`, so the
// pipeline can be driven by OpenRouter, OpenAI, or a scripted fake in tests.

use anyhow::Result;
use async_trait::async_trait;

pub mod factory;
pub mod openai;
pub mod types;

pub use factory::create_provider;
pub use openai::OpenAIProvider;
pub use types::{Message, ProviderRequest, ProviderResponse};

/// Trait for text-generation providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a request and wait for the complete response
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Provider name (e.g. "openrouter", "openai")
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty
    fn default_model(&self) -> &str;
}
