// Multi-stage pipeline
//
// Research -> Compose -> EnrichKeywords -> Finalize, each run exactly once per
// invocation. With feedback in the context every stage revises against that
// same text; without it every stage generates fresh. No looping here: retries
// belong to the orchestrator.

pub mod context;
pub mod prompts;
pub mod stage;

pub use context::{ContextError, GenerationContext};
pub use stage::{PromptStage, StageKind};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Persona;
use crate::providers::LlmProvider;

/// Produces a candidate post from a seed context
#[async_trait]
pub trait ContentPipeline: Send + Sync {
    async fn run(&self, ctx: GenerationContext) -> Result<GenerationContext>;
}

/// The Finalize output of a completed pipeline run
pub fn candidate(ctx: &GenerationContext) -> Result<&str> {
    ctx.get(StageKind::Finalize.output_key())
        .context("pipeline finished without a final output")
}

pub struct StagePipeline {
    stages: Vec<PromptStage>,
}

impl StagePipeline {
    /// Four prompt stages sharing one provider, model and persona
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        persona: Arc<Persona>,
        model: impl Into<String>,
        char_limit: usize,
    ) -> Self {
        let model = model.into();
        let stages = StageKind::ORDER
            .iter()
            .map(|&kind| {
                PromptStage::new(kind, provider.clone(), persona.clone(), char_limit)
                    .with_model(model.clone())
            })
            .collect();
        Self { stages }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.stages = self
            .stages
            .into_iter()
            .map(|s| s.with_sampling(max_tokens, temperature))
            .collect();
        self
    }
}

#[async_trait]
impl ContentPipeline for StagePipeline {
    async fn run(&self, mut ctx: GenerationContext) -> Result<GenerationContext> {
        let feedback = ctx.feedback().map(str::to_owned);

        for stage in &self.stages {
            let kind = stage.kind();
            let started = Instant::now();

            let output = match feedback.as_deref() {
                Some(feedback) => stage.revise_with_feedback(&ctx, feedback).await,
                None => stage.generate(&ctx).await,
            };

            let output = match output {
                Ok(output) => output,
                Err(e) => {
                    crate::metrics::record_stage_failure(kind.name());
                    return Err(e);
                }
            };

            crate::metrics::record_stage_duration(kind.name(), started.elapsed().as_secs_f64());
            tracing::debug!("{} stage produced {} chars", kind.name(), output.chars().count());

            ctx.attach(kind.output_key(), output)?;
        }

        Ok(ctx)
    }
}
