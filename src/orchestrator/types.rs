// Orchestrator types: attempts, terminal outcomes, loop settings

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::GenerationContext;
use crate::publish::PublishError;
use crate::review::ReviewResult;

/// Exit code for a published run
pub const EXIT_PUBLISHED: u8 = 0;
/// Exit code when every attempt was rejected or crashed
pub const EXIT_EXHAUSTED: u8 = 2;
/// Exit code when approved content could not be delivered
pub const EXIT_PUBLISH_FAILED: u8 = 3;

/// How a single generate/review pass ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Reviewed(ReviewResult),
    /// A stage or the reviewer errored before a decision was made
    Failed { error: String },
}

/// One generate/review pass, numbered from 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub number: u32,
    pub context: GenerationContext,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    /// Feedback to thread into the next attempt (rejections only)
    pub fn feedback(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Reviewed(ReviewResult::Rejected { feedback }) => Some(feedback),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// The single terminal result of a run
#[derive(Debug, Clone, PartialEq)]
pub enum FinalOutcome {
    Published {
        artifact: String,
        post_id: String,
        attempt_count: u32,
    },
    ExhaustedRetries {
        last_context: GenerationContext,
        last_feedback: Option<String>,
        attempt_count: u32,
    },
    PublishFailed {
        artifact: String,
        attempt_count: u32,
        error: PublishError,
    },
}

impl FinalOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            FinalOutcome::Published { .. } => "published",
            FinalOutcome::ExhaustedRetries { .. } => "exhausted_retries",
            FinalOutcome::PublishFailed { .. } => "publish_failed",
        }
    }

    pub fn attempt_count(&self) -> u32 {
        match self {
            FinalOutcome::Published { attempt_count, .. }
            | FinalOutcome::ExhaustedRetries { attempt_count, .. }
            | FinalOutcome::PublishFailed { attempt_count, .. } => *attempt_count,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, FinalOutcome::Published { .. })
    }

    /// Process exit code for `quill run`
    pub fn exit_code(&self) -> u8 {
        match self {
            FinalOutcome::Published { .. } => EXIT_PUBLISHED,
            FinalOutcome::ExhaustedRetries { .. } => EXIT_EXHAUSTED,
            FinalOutcome::PublishFailed { .. } => EXIT_PUBLISH_FAILED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    pub max_attempts: u32,
}

impl LoopConfig {
    pub fn new(max_attempts: u32) -> Result<Self, LoopConfigError> {
        if max_attempts == 0 {
            return Err(LoopConfigError::ZeroAttempts);
        }
        Ok(Self { max_attempts })
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::constants::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
}
