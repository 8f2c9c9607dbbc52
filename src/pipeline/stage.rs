// Generation stage
//
// One prompt-driven step. The stage picks its templates from its kind and the
// context's category, makes a single provider call and returns the text.
// Errors are not caught here.

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use super::context::{self, GenerationContext};
use super::prompts;
use crate::calendar::ContentCategory;
use crate::config::Persona;
use crate::providers::{LlmProvider, Message, ProviderRequest};

/// The four stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Research,
    Compose,
    EnrichKeywords,
    Finalize,
}

impl StageKind {
    pub const ORDER: [StageKind; 4] = [
        StageKind::Research,
        StageKind::Compose,
        StageKind::EnrichKeywords,
        StageKind::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Compose => "compose",
            StageKind::EnrichKeywords => "enrich_keywords",
            StageKind::Finalize => "finalize",
        }
    }

    /// Context key the stage's output is attached under
    pub fn output_key(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Compose => "draft",
            StageKind::EnrichKeywords => "keyworded",
            StageKind::Finalize => "final",
        }
    }
}

pub struct PromptStage {
    kind: StageKind,
    provider: Arc<dyn LlmProvider>,
    persona: Arc<Persona>,
    /// Empty means the provider's default model
    model: String,
    char_limit: usize,
    max_tokens: u32,
    temperature: f32,
}

impl PromptStage {
    pub fn new(
        kind: StageKind,
        provider: Arc<dyn LlmProvider>,
        persona: Arc<Persona>,
        char_limit: usize,
    ) -> Self {
        Self {
            kind,
            provider,
            persona,
            model: String::new(),
            char_limit,
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            temperature: crate::config::constants::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Fresh output for this stage
    pub async fn generate(&self, ctx: &GenerationContext) -> Result<String> {
        self.call(ctx, None).await
    }

    /// Output revised against reviewer feedback
    pub async fn revise_with_feedback(&self, ctx: &GenerationContext, feedback: &str) -> Result<String> {
        self.call(ctx, Some(feedback)).await
    }

    async fn call(&self, ctx: &GenerationContext, feedback: Option<&str>) -> Result<String> {
        let category = category_of(ctx);

        let request = ProviderRequest::new(vec![Message::user(prompts::user_prompt(
            self.kind, category, ctx,
        ))])
        .with_model(self.model.clone())
        .with_system(prompts::system_prompt(
            self.kind,
            category,
            &self.persona,
            self.char_limit,
            feedback,
        ))
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let response = self
            .provider
            .send_message(&request)
            .await
            .with_context(|| format!("{} stage request failed", self.kind.name()))?;

        let output = response.text.trim();
        if output.is_empty() {
            bail!("{} stage returned empty output", self.kind.name());
        }

        Ok(output.to_string())
    }
}

/// Category named in the context, falling back to an explainer
fn category_of(ctx: &GenerationContext) -> ContentCategory {
    ctx.get(context::CATEGORY)
        .and_then(|c| c.parse().ok())
        .unwrap_or(ContentCategory::EducationExplainer)
}
