// Review stage
//
// The gatekeeper: one call to the (stronger) review model, whose free-text
// reply is reduced to Approved{clean_artifact} or Rejected{feedback}.

pub mod extract;

pub use extract::{extract_artifact, ExtractionError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Persona;
use crate::pipeline::context::{self, GenerationContext};
use crate::providers::{LlmProvider, Message, ProviderRequest};

/// Reviewer decision for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewResult {
    Approved { clean_artifact: String },
    Rejected { feedback: String },
}

impl ReviewResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewResult::Approved { .. })
    }

    /// Metric/journal label
    pub fn label(&self) -> &'static str {
        match self {
            ReviewResult::Approved { .. } => "approved",
            ReviewResult::Rejected { .. } => "rejected",
        }
    }
}

/// Anything that can pass judgement on a candidate post
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        candidate: &str,
        ctx: &GenerationContext,
        attempt: u32,
    ) -> Result<ReviewResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approve,
    Reject,
}

// Only a verdict at the very start counts: "APPROVE: ...", "Decision: REJECT - ..."
static LEADING_VERDICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*(?:decision[ \t]*:[ \t]*)?(approved?|reject(?:ed)?)\b")
        .expect("verdict regex")
});

fn leading_verdict(text: &str) -> Option<Verdict> {
    LEADING_VERDICT.captures(text).map(|caps| {
        if caps[1].to_ascii_lowercase().starts_with("approve") {
            Verdict::Approve
        } else {
            Verdict::Reject
        }
    })
}

/// Reduce a reviewer reply to a decision.
///
/// Only a reply that opens with APPROVE (optionally after `Decision:`) is an
/// approval; it goes through `extract_artifact`, and if nothing publishable is
/// left the result is a rejection with the extraction error as feedback.
/// Everything else, including a verdict buried mid-reply, is rejected with the
/// whole reply as feedback.
pub fn interpret_decision(text: &str, char_limit: usize) -> ReviewResult {
    if leading_verdict(text) != Some(Verdict::Approve) {
        return ReviewResult::Rejected {
            feedback: text.to_string(),
        };
    }

    match extract_artifact(text, char_limit) {
        Ok(clean_artifact) => ReviewResult::Approved { clean_artifact },
        Err(e) => ReviewResult::Rejected {
            feedback: e.to_string(),
        },
    }
}

/// Review stage backed by a text-generation provider
pub struct ReviewStage {
    provider: Arc<dyn LlmProvider>,
    persona: Arc<Persona>,
    model: String,
    char_limit: usize,
    max_tokens: u32,
    temperature: f32,
}

impl ReviewStage {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        persona: Arc<Persona>,
        model: impl Into<String>,
        char_limit: usize,
    ) -> Self {
        Self {
            provider,
            persona,
            model: model.into(),
            char_limit,
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            temperature: crate::config::constants::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn system_prompt(&self, attempt: u32) -> String {
        format!(
            "You are the final gatekeeper reviewing a post for {name} ({handle}) before \
             publication. This is attempt {attempt}.\n\n\
             You have high standards for:\n\
             1. Content quality and accuracy\n\
             2. Consistency with the author's voice: {voice}\n\
             3. Concrete value for the reader, with specific numbers where possible\n\
             4. Credibility: no invented experience or claims\n\
             5. Fitting within {limit} characters\n\n\
             Respond with either APPROVE or REJECT.\n\n\
             If APPROVE: start with \"APPROVE:\" then give ONLY the final clean post, ready to \
             publish, with no commentary.\n\
             If REJECT: start with \"REJECT:\" then give specific, actionable feedback for \
             improvement.",
            name = self.persona.name,
            handle = self.persona.handle,
            voice = self.persona.voice,
            attempt = attempt,
            limit = self.char_limit,
        )
    }

    fn user_prompt(&self, candidate: &str, ctx: &GenerationContext, attempt: u32) -> String {
        format!(
            "ATTEMPT: {attempt}\n\
             THEME: {theme}\n\
             CONTENT TYPE: {category}\n\
             TOPIC: {topic}\n\
             FINAL CONTENT:\n{candidate}\n\n\
             Decision: APPROVE or REJECT",
            attempt = attempt,
            theme = ctx.get(context::THEME).unwrap_or("general"),
            category = ctx.get(context::CATEGORY).unwrap_or("general"),
            topic = ctx.get(context::TOPIC).unwrap_or("general"),
            candidate = candidate,
        )
    }
}

#[async_trait]
impl Reviewer for ReviewStage {
    async fn review(
        &self,
        candidate: &str,
        ctx: &GenerationContext,
        attempt: u32,
    ) -> Result<ReviewResult> {
        let request = ProviderRequest::new(vec![Message::user(
            self.user_prompt(candidate, ctx, attempt),
        )])
        .with_model(self.model.clone())
        .with_system(self.system_prompt(attempt))
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let started = Instant::now();
        let response = self
            .provider
            .send_message(&request)
            .await
            .with_context(|| format!("Review call failed on attempt {}", attempt))?;
        crate::metrics::record_stage_duration("review", started.elapsed().as_secs_f64());

        let result = interpret_decision(&response.text, self.char_limit);
        tracing::debug!("Reviewer decision on attempt {}: {}", attempt, result.label());
        Ok(result)
    }
}
