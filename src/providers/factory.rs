// Provider factory
//
// Builds the configured text-generation provider

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use super::openai::OpenAIProvider;
use super::LlmProvider;
use crate::config::{ProviderConfig, ProviderKind};

/// Create the provider described by `[provider]`.
///
/// The stage model becomes the provider default; the reviewer names its own
/// model on every request.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    if config.api_key.trim().is_empty() {
        bail!("No API key configured for {:?} provider", config.kind);
    }

    let provider = match config.kind {
        ProviderKind::Openrouter => OpenAIProvider::new_openrouter(config.api_key.clone())?,
        ProviderKind::Openai => OpenAIProvider::new_openai(config.api_key.clone())?,
    };

    let mut provider = provider
        .with_model(config.stage_model.clone())
        .with_timeout(Duration::from_secs(config.timeout_secs))?;

    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }

    tracing::debug!(
        "Created {} provider (stage model: {})",
        provider.name(),
        provider.default_model()
    );

    Ok(Arc::new(provider))
}
