// End-to-end feedback loop tests
//
// The real stage pipeline and reviewer run against a scripted provider;
// stores live in a temp directory.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use quill::config::Persona;
use quill::logging::{RunEvent, RunJournal};
use quill::orchestrator::{FeedbackLoop, FinalOutcome};
use quill::pipeline::{context, GenerationContext, StagePipeline};
use quill::providers::{LlmProvider, ProviderRequest, ProviderResponse};
use quill::publish::DryRunPublisher;
use quill::review::ReviewStage;
use quill::store::{FailureStatus, JsonFailureStore, SqliteAnalyticsStore};

const STAGE_MODEL: &str = "stage-model";
const REVIEW_MODEL: &str = "review-model";

/// Stage calls get numbered drafts; review calls pop the next scripted reply
struct ScriptedProvider {
    failing_stage_calls: Mutex<u32>,
    reviews: Mutex<VecDeque<String>>,
    stage_systems: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(reviews: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_stage_calls: Mutex::new(0),
            reviews: Mutex::new(reviews.iter().map(|r| r.to_string()).collect()),
            stage_systems: Mutex::new(Vec::new()),
        })
    }

    /// The first stage call fails with a transport error
    fn failing_first_stage(reviews: &[&str]) -> Arc<Self> {
        let provider = Self::new(reviews);
        *provider.failing_stage_calls.lock().unwrap() = 1;
        provider
    }

    /// System prompts of the stage calls that succeeded
    fn stage_systems(&self) -> Vec<String> {
        self.stage_systems.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let text = if request.model == REVIEW_MODEL {
            match self.reviews.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => bail!("review script exhausted"),
            }
        } else {
            {
                let mut failing = self.failing_stage_calls.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    bail!("connection reset by peer");
                }
            }
            let mut systems = self.stage_systems.lock().unwrap();
            systems.push(request.system.clone().unwrap_or_default());
            format!("draft {}", systems.len())
        };

        Ok(ProviderResponse {
            id: "gen".to_string(),
            model: request.model.clone(),
            text,
            stop_reason: Some("stop".to_string()),
            provider: "scripted".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        STAGE_MODEL
    }
}

struct Harness {
    _dir: TempDir,
    failures: Arc<JsonFailureStore>,
    analytics: Arc<SqliteAnalyticsStore>,
    journal: Arc<RunJournal>,
    publisher: Arc<DryRunPublisher>,
    feedback_loop: FeedbackLoop,
}

fn harness(provider: Arc<ScriptedProvider>, max_attempts: u32) -> Harness {
    let dir = TempDir::new().unwrap();
    let failures = Arc::new(JsonFailureStore::new(dir.path().join("failed")).unwrap());
    let analytics = Arc::new(SqliteAnalyticsStore::open(&dir.path().join("analytics.db")).unwrap());
    let journal = Arc::new(RunJournal::new(dir.path().to_path_buf()).unwrap());
    let publisher = Arc::new(DryRunPublisher::new());
    let persona = Arc::new(Persona::default());

    let pipeline = StagePipeline::new(provider.clone(), persona.clone(), STAGE_MODEL, 280);
    let reviewer = ReviewStage::new(provider, persona, REVIEW_MODEL, 280);

    let feedback_loop = FeedbackLoop::new(
        Arc::new(pipeline),
        Arc::new(reviewer),
        publisher.clone(),
        failures.clone(),
        max_attempts,
    )
    .unwrap()
    .with_analytics(analytics.clone())
    .with_journal(journal.clone());

    Harness {
        _dir: dir,
        failures,
        analytics,
        journal,
        publisher,
        feedback_loop,
    }
}

fn seed() -> GenerationContext {
    GenerationContext::new()
        .with_field(context::TOPIC, "automating weekly reports")
        .with_field(context::CATEGORY, "education_explainer")
        .with_field(context::THEME, "foundation_building")
        .with_field(context::TRENDS, "No current search results available")
}

#[tokio::test]
async fn test_approved_on_first_attempt() {
    let provider = ScriptedProvider::new(&["APPROVE: Great tip on automation! #AI"]);
    let h = harness(provider.clone(), 3);

    let outcome = h.feedback_loop.run(&seed()).await;

    match &outcome {
        FinalOutcome::Published {
            artifact,
            attempt_count,
            ..
        } => {
            assert_eq!(artifact, "Great tip on automation! #AI");
            assert_eq!(*attempt_count, 1);
        }
        other => panic!("expected Published, got {:?}", other),
    }
    assert_eq!(h.publisher.published(), vec!["Great tip on automation! #AI"]);
    assert_eq!(provider.stage_systems().len(), 4);

    let rows = h.analytics.recent(5).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts_needed, 1);
    assert_eq!(rows[0].topic.as_deref(), Some("automating weekly reports"));
    assert!(h.failures.list(5).unwrap().is_empty());
}

#[tokio::test]
async fn test_feedback_from_previous_attempt_reaches_every_stage() {
    let provider = ScriptedProvider::new(&[
        "REJECT: too generic",
        "REJECT: too generic",
        "APPROVE: Cut report prep from 3h to 20min with one cron job.",
    ]);
    let h = harness(provider.clone(), 3);

    let outcome = h.feedback_loop.run(&seed()).await;
    assert!(outcome.is_published());
    assert_eq!(outcome.attempt_count(), 3);

    let systems = provider.stage_systems();
    assert_eq!(systems.len(), 12);
    assert!(systems[..4].iter().all(|s| !s.contains("REJECTED")));
    assert!(systems[8..].iter().all(|s| s.contains("REJECT: too generic")));
}

#[tokio::test]
async fn test_all_rejections_persist_failure_record() {
    let provider = ScriptedProvider::new(&[
        "REJECT: no hook",
        "REJECT: still no hook",
        "REJECT: too long",
    ]);
    let h = harness(provider, 3);

    let outcome = h.feedback_loop.run(&seed()).await;

    match &outcome {
        FinalOutcome::ExhaustedRetries {
            last_context,
            last_feedback,
            attempt_count,
        } => {
            assert_eq!(*attempt_count, 3);
            assert_eq!(last_feedback.as_deref(), Some("REJECT: too long"));
            assert_eq!(last_context.feedback(), Some("REJECT: still no hook"));
            assert_eq!(last_context.get("final"), Some("draft 12"));
        }
        other => panic!("expected ExhaustedRetries, got {:?}", other),
    }
    assert!(h.publisher.published().is_empty());

    let records = h.failures.list(5).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, FailureStatus::RequiresManualReview);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.last_feedback.as_deref(), Some("REJECT: too long"));
    assert_eq!(record.last_context.get("final"), Some("draft 12"));
    assert_eq!(h.analytics.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_long_approval_is_truncated_to_limit() {
    let reply = format!("APPROVE: {}", "x".repeat(310));
    let provider = ScriptedProvider::new(&[reply.as_str()]);
    let h = harness(provider, 3);

    let outcome = h.feedback_loop.run(&seed()).await;

    match outcome {
        FinalOutcome::Published { artifact, .. } => {
            assert_eq!(artifact.chars().count(), 280);
            assert!(artifact.ends_with("..."));
            assert!(artifact.starts_with("xxx"));
        }
        other => panic!("expected Published, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_error_retries_without_feedback() {
    let provider = ScriptedProvider::failing_first_stage(&["APPROVE: Ready to post: Ship it."]);
    let h = harness(provider.clone(), 3);

    let outcome = h.feedback_loop.run(&seed()).await;

    assert!(outcome.is_published());
    assert_eq!(outcome.attempt_count(), 2);

    // The failed call never recorded a prompt; attempt 2 ran all four stages fresh
    let systems = provider.stage_systems();
    assert_eq!(systems.len(), 4);
    assert!(systems.iter().all(|s| !s.contains("REJECTED")));
    assert_eq!(h.publisher.published(), vec!["Ship it."]);

    let events = h.journal.read_today().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::AttemptFailed { attempt: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::AttemptStart {
            attempt: 2,
            with_feedback: false,
            ..
        }
    )));
}

#[tokio::test]
async fn test_empty_approval_counts_as_rejection() {
    let provider = ScriptedProvider::new(&["APPROVE:", "APPROVE: Second time lucky"]);
    let h = harness(provider.clone(), 2);

    let outcome = h.feedback_loop.run(&seed()).await;

    assert!(outcome.is_published());
    assert_eq!(outcome.attempt_count(), 2);
    let systems = provider.stage_systems();
    assert!(systems[4..]
        .iter()
        .all(|s| s.contains("empty content extracted")));
}
