// Feedback loop orchestrator
//
// Drives pipeline -> review -> publish with a bounded number of attempts.
// A rejection feeds its text into the next attempt; a crash consumes the
// attempt and the next one starts fresh. Every run ends in exactly one
// `FinalOutcome`: errors from stages, the reviewer or the stores never
// escape `run`.

mod types;

pub use types::{
    Attempt, AttemptOutcome, FinalOutcome, LoopConfig, LoopConfigError, EXIT_EXHAUSTED,
    EXIT_PUBLISHED, EXIT_PUBLISH_FAILED,
};

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::logging::{RunEvent, RunJournal};
use crate::metrics;
use crate::pipeline::{self, context, ContentPipeline, GenerationContext};
use crate::publish::Publisher;
use crate::review::{ReviewResult, Reviewer};
use crate::store::{AnalyticsStore, FailureRecord, FailureStatus, FailureStore, PublishedRecord};

pub struct FeedbackLoop {
    pipeline: Arc<dyn ContentPipeline>,
    reviewer: Arc<dyn Reviewer>,
    publisher: Arc<dyn Publisher>,
    failures: Arc<dyn FailureStore>,
    analytics: Option<Arc<dyn AnalyticsStore>>,
    journal: Option<Arc<RunJournal>>,
    config: LoopConfig,
}

impl FeedbackLoop {
    pub fn new(
        pipeline: Arc<dyn ContentPipeline>,
        reviewer: Arc<dyn Reviewer>,
        publisher: Arc<dyn Publisher>,
        failures: Arc<dyn FailureStore>,
        max_attempts: u32,
    ) -> Result<Self, LoopConfigError> {
        Ok(Self {
            pipeline,
            reviewer,
            publisher,
            failures,
            analytics: None,
            journal: None,
            config: LoopConfig::new(max_attempts)?,
        })
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsStore>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_journal(mut self, journal: Arc<RunJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run until a post is published, delivery fails, or attempts run out.
    ///
    /// Each attempt starts from `seed` plus the previous attempt's feedback;
    /// stage outputs of earlier attempts are not carried forward.
    pub async fn run(&self, seed: &GenerationContext) -> FinalOutcome {
        let run_id = Uuid::new_v4().to_string();
        let max_attempts = self.config.max_attempts;

        tracing::info!(
            run_id = %run_id,
            topic = seed.get(context::TOPIC).unwrap_or("-"),
            max_attempts,
            "Starting content run"
        );
        self.journal(&RunEvent::RunStart {
            run_id: run_id.clone(),
            topic: seed.get(context::TOPIC).map(str::to_owned),
            category: seed.get(context::CATEGORY).map(str::to_owned),
            max_attempts,
        });

        let mut feedback: Option<String> = None;
        let mut last_context = seed.clone();
        let mut last_error: Option<String> = None;

        for number in 1..=max_attempts {
            let ctx = seed.with_feedback(feedback.take());
            metrics::record_attempt();
            self.journal(&RunEvent::AttemptStart {
                run_id: run_id.clone(),
                attempt: number,
                with_feedback: ctx.feedback().is_some(),
            });

            let attempt = self.attempt(number, ctx).await;
            self.record_attempt(&run_id, &attempt);

            match attempt.outcome {
                AttemptOutcome::Reviewed(ReviewResult::Approved { clean_artifact }) => {
                    return self
                        .deliver(&run_id, clean_artifact, attempt.context, number)
                        .await;
                }
                AttemptOutcome::Reviewed(ReviewResult::Rejected { feedback: text }) => {
                    feedback = Some(text);
                    last_error = None;
                }
                AttemptOutcome::Failed { error } => {
                    last_error = Some(error);
                }
            }
            last_context = attempt.context;
        }

        tracing::warn!(
            run_id = %run_id,
            attempts = max_attempts,
            "All attempts rejected or failed, saving for manual review"
        );

        let record = FailureRecord {
            run_id: run_id.clone(),
            recorded_at: Utc::now(),
            status: FailureStatus::RequiresManualReview,
            attempts: max_attempts,
            last_context: last_context.clone(),
            last_feedback: feedback.clone(),
            last_error,
            artifact: None,
        };
        self.persist_failure(&record).await;
        self.journal(&RunEvent::Exhausted {
            run_id,
            attempt_count: max_attempts,
        });

        self.finish(FinalOutcome::ExhaustedRetries {
            last_context,
            last_feedback: feedback,
            attempt_count: max_attempts,
        })
    }

    async fn attempt(&self, number: u32, ctx: GenerationContext) -> Attempt {
        match self.generate_and_review(ctx.clone(), number).await {
            Ok((context, review)) => Attempt {
                number,
                context,
                outcome: AttemptOutcome::Reviewed(review),
            },
            Err(e) => Attempt {
                number,
                context: ctx,
                outcome: AttemptOutcome::Failed {
                    error: format!("{:#}", e),
                },
            },
        }
    }

    async fn generate_and_review(
        &self,
        ctx: GenerationContext,
        number: u32,
    ) -> Result<(GenerationContext, ReviewResult)> {
        let ctx = self.pipeline.run(ctx).await?;
        let review = {
            let candidate = pipeline::candidate(&ctx)?;
            self.reviewer.review(candidate, &ctx, number).await?
        };
        Ok((ctx, review))
    }

    fn record_attempt(&self, run_id: &str, attempt: &Attempt) {
        match &attempt.outcome {
            AttemptOutcome::Reviewed(review) => {
                metrics::record_review(review.label());
                let feedback = attempt.feedback().map(str::to_owned);
                match &feedback {
                    Some(text) => tracing::info!(
                        attempt = attempt.number,
                        "Draft rejected: {}",
                        text.lines().next().unwrap_or_default()
                    ),
                    None => tracing::info!(attempt = attempt.number, "Draft approved"),
                }
                self.journal(&RunEvent::Review {
                    run_id: run_id.to_string(),
                    attempt: attempt.number,
                    decision: review.label().to_string(),
                    feedback,
                });
            }
            AttemptOutcome::Failed { error } => {
                tracing::warn!(attempt = attempt.number, "Attempt failed: {}", error);
                self.journal(&RunEvent::AttemptFailed {
                    run_id: run_id.to_string(),
                    attempt: attempt.number,
                    error: error.clone(),
                });
            }
        }
    }

    async fn deliver(
        &self,
        run_id: &str,
        artifact: String,
        context: GenerationContext,
        attempt_count: u32,
    ) -> FinalOutcome {
        match self.publisher.publish(&artifact).await {
            Ok(post) => {
                tracing::info!(
                    post_id = %post.id,
                    publisher = self.publisher.name(),
                    attempt_count,
                    "Post published"
                );

                if let Some(analytics) = &self.analytics {
                    let record =
                        PublishedRecord::new(post.id.clone(), artifact.clone(), &context, attempt_count);
                    if let Err(e) = analytics.append(&record).await {
                        tracing::warn!("Failed to record analytics for {}: {:#}", post.id, e);
                    }
                }
                self.journal(&RunEvent::Published {
                    run_id: run_id.to_string(),
                    attempt_count,
                    post_id: post.id.clone(),
                });

                self.finish(FinalOutcome::Published {
                    artifact,
                    post_id: post.id,
                    attempt_count,
                })
            }
            Err(error) => {
                tracing::error!(publisher = self.publisher.name(), "Publish failed: {}", error);

                let record = FailureRecord {
                    run_id: run_id.to_string(),
                    recorded_at: Utc::now(),
                    status: FailureStatus::PublishFailed,
                    attempts: attempt_count,
                    last_context: context,
                    last_feedback: None,
                    last_error: Some(error.to_string()),
                    artifact: Some(artifact.clone()),
                };
                self.persist_failure(&record).await;
                self.journal(&RunEvent::PublishFailed {
                    run_id: run_id.to_string(),
                    attempt_count,
                    error: error.to_string(),
                });

                self.finish(FinalOutcome::PublishFailed {
                    artifact,
                    attempt_count,
                    error,
                })
            }
        }
    }

    async fn persist_failure(&self, record: &FailureRecord) {
        if let Err(e) = self.failures.append(record).await {
            tracing::error!("Failed to save failure record {}: {:#}", record.run_id, e);
        }
    }

    fn journal(&self, event: &RunEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.log(event) {
                tracing::warn!("Failed to write run journal: {:#}", e);
            }
        }
    }

    fn finish(&self, outcome: FinalOutcome) -> FinalOutcome {
        metrics::record_outcome(outcome.label());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{PublishError, PublishedPost};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Attaches a fixed `final` output, or fails when scripted to
    struct ScriptedPipeline {
        script: Mutex<VecDeque<Option<&'static str>>>,
        seen: Mutex<Vec<GenerationContext>>,
    }

    impl ScriptedPipeline {
        fn new(script: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<GenerationContext> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentPipeline for ScriptedPipeline {
        async fn run(&self, mut ctx: GenerationContext) -> Result<GenerationContext> {
            self.seen.lock().unwrap().push(ctx.clone());
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(text) => {
                    ctx.attach("final", text)?;
                    Ok(ctx)
                }
                None => anyhow::bail!("compose stage timed out"),
            }
        }
    }

    struct ScriptedReviewer {
        script: Mutex<VecDeque<ReviewResult>>,
    }

    impl ScriptedReviewer {
        fn new(script: Vec<ReviewResult>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl Reviewer for ScriptedReviewer {
        async fn review(
            &self,
            _candidate: &str,
            _ctx: &GenerationContext,
            _attempt: u32,
        ) -> Result<ReviewResult> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted review left"))
        }
    }

    struct FakePublisher {
        fail_with: Option<PublishError>,
        posted: Mutex<Vec<String>>,
    }

    impl FakePublisher {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail_with: None,
                posted: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: PublishError) -> Arc<Self> {
            Arc::new(Self {
                fail_with: Some(error),
                posted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, text: &str) -> Result<PublishedPost, PublishError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            self.posted.lock().unwrap().push(text.to_string());
            Ok(PublishedPost {
                id: "post-1".to_string(),
                text: text.to_string(),
            })
        }

        async fn reply(&self, text: &str, _in_reply_to: &str) -> Result<PublishedPost, PublishError> {
            self.publish(text).await
        }

        async fn verify(&self) -> Result<String, PublishError> {
            Ok("acct".to_string())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    struct MemoryFailures {
        records: Mutex<Vec<FailureRecord>>,
        broken: bool,
    }

    #[async_trait]
    impl FailureStore for MemoryFailures {
        async fn append(&self, record: &FailureRecord) -> Result<()> {
            if self.broken {
                anyhow::bail!("disk full");
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryAnalytics {
        records: Mutex<Vec<PublishedRecord>>,
    }

    #[async_trait]
    impl AnalyticsStore for MemoryAnalytics {
        async fn append(&self, record: &PublishedRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn approved(text: &str) -> ReviewResult {
        ReviewResult::Approved {
            clean_artifact: text.to_string(),
        }
    }

    fn rejected(text: &str) -> ReviewResult {
        ReviewResult::Rejected {
            feedback: text.to_string(),
        }
    }

    fn seed() -> GenerationContext {
        GenerationContext::new()
            .with_field(context::TOPIC, "caching")
            .with_field(context::CATEGORY, "education_explainer")
    }

    #[test]
    fn test_zero_attempts_is_rejected_at_construction() {
        let result = FeedbackLoop::new(
            ScriptedPipeline::new(vec![]),
            ScriptedReviewer::new(vec![]),
            FakePublisher::ok(),
            Arc::new(MemoryFailures::default()),
            0,
        );
        assert!(matches!(result, Err(LoopConfigError::ZeroAttempts)));
    }

    #[tokio::test]
    async fn test_first_attempt_approved() {
        let pipeline = ScriptedPipeline::new(vec![Some("draft")]);
        let publisher = FakePublisher::ok();
        let analytics = Arc::new(MemoryAnalytics::default());
        let failures = Arc::new(MemoryFailures::default());

        let feedback_loop = FeedbackLoop::new(
            pipeline.clone(),
            ScriptedReviewer::new(vec![approved("Clean post")]),
            publisher.clone(),
            failures.clone(),
            3,
        )
        .unwrap()
        .with_analytics(analytics.clone());

        let outcome = feedback_loop.run(&seed()).await;

        assert_eq!(
            outcome,
            FinalOutcome::Published {
                artifact: "Clean post".to_string(),
                post_id: "post-1".to_string(),
                attempt_count: 1,
            }
        );
        assert_eq!(pipeline.seen().len(), 1);
        assert_eq!(pipeline.seen()[0].feedback(), None);
        assert_eq!(*publisher.posted.lock().unwrap(), vec!["Clean post"]);

        let rows = analytics.records.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attempts_needed, 1);
        assert_eq!(rows[0].topic.as_deref(), Some("caching"));
        assert!(failures.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_threads_into_next_attempt_verbatim() {
        let pipeline = ScriptedPipeline::new(vec![Some("v1"), Some("v2")]);
        let feedback_loop = FeedbackLoop::new(
            pipeline.clone(),
            ScriptedReviewer::new(vec![rejected("Too generic.\nAdd a number."), approved("v2")]),
            FakePublisher::ok(),
            Arc::new(MemoryFailures::default()),
            3,
        )
        .unwrap();

        let outcome = feedback_loop.run(&seed()).await;
        assert_eq!(outcome.attempt_count(), 2);
        assert!(outcome.is_published());

        let seen = pipeline.seen();
        assert_eq!(seen[0].feedback(), None);
        assert_eq!(seen[1].feedback(), Some("Too generic.\nAdd a number."));
        // Earlier stage outputs are not carried forward
        assert!(!seen[1].contains("final"));
        assert_eq!(seen[1].get(context::TOPIC), Some("caching"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_persists_failure() {
        let failures = Arc::new(MemoryFailures::default());
        let publisher = FakePublisher::ok();
        let feedback_loop = FeedbackLoop::new(
            ScriptedPipeline::new(vec![Some("a"), Some("b"), Some("c")]),
            ScriptedReviewer::new(vec![rejected("one"), rejected("two"), rejected("three")]),
            publisher.clone(),
            failures.clone(),
            3,
        )
        .unwrap();

        let outcome = feedback_loop.run(&seed()).await;

        match outcome {
            FinalOutcome::ExhaustedRetries {
                last_context,
                last_feedback,
                attempt_count,
            } => {
                assert_eq!(attempt_count, 3);
                assert_eq!(last_feedback.as_deref(), Some("three"));
                assert_eq!(last_context.get("final"), Some("c"));
                assert_eq!(last_context.feedback(), Some("two"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(publisher.posted.lock().unwrap().is_empty());

        let records = failures.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, FailureStatus::RequiresManualReview);
        assert_eq!(records[0].attempts, 3);
        assert_eq!(records[0].last_feedback.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_crash_consumes_attempt_and_next_starts_fresh() {
        let pipeline = ScriptedPipeline::new(vec![Some("v1"), None, Some("v3")]);
        let feedback_loop = FeedbackLoop::new(
            pipeline.clone(),
            ScriptedReviewer::new(vec![rejected("fix it"), approved("v3")]),
            FakePublisher::ok(),
            Arc::new(MemoryFailures::default()),
            3,
        )
        .unwrap();

        let outcome = feedback_loop.run(&seed()).await;
        assert!(outcome.is_published());
        assert_eq!(outcome.attempt_count(), 3);

        let seen = pipeline.seen();
        assert_eq!(seen[1].feedback(), Some("fix it"));
        assert_eq!(seen[2].feedback(), None);
    }

    #[tokio::test]
    async fn test_crash_on_last_attempt_exhausts_with_error() {
        let failures = Arc::new(MemoryFailures::default());
        let feedback_loop = FeedbackLoop::new(
            ScriptedPipeline::new(vec![Some("v1"), None]),
            ScriptedReviewer::new(vec![rejected("nope")]),
            FakePublisher::ok(),
            failures.clone(),
            2,
        )
        .unwrap();

        let outcome = feedback_loop.run(&seed()).await;
        match outcome {
            FinalOutcome::ExhaustedRetries {
                last_feedback,
                attempt_count,
                ..
            } => {
                assert_eq!(attempt_count, 2);
                assert_eq!(last_feedback, None);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }

        let records = failures.records.lock().unwrap();
        assert!(records[0]
            .last_error
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_publish_failure_is_terminal_and_persisted() {
        let failures = Arc::new(MemoryFailures::default());
        let analytics = Arc::new(MemoryAnalytics::default());
        let error = PublishError::Unauthorized("bad token".to_string());
        let feedback_loop = FeedbackLoop::new(
            ScriptedPipeline::new(vec![Some("v1")]),
            ScriptedReviewer::new(vec![approved("Ship it")]),
            FakePublisher::failing(error.clone()),
            failures.clone(),
            3,
        )
        .unwrap()
        .with_analytics(analytics.clone());

        let outcome = feedback_loop.run(&seed()).await;
        assert_eq!(
            outcome,
            FinalOutcome::PublishFailed {
                artifact: "Ship it".to_string(),
                attempt_count: 1,
                error,
            }
        );
        assert!(analytics.records.lock().unwrap().is_empty());

        let records = failures.records.lock().unwrap();
        assert_eq!(records[0].status, FailureStatus::PublishFailed);
        assert_eq!(records[0].artifact.as_deref(), Some("Ship it"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_change_outcome() {
        let failures = Arc::new(MemoryFailures {
            broken: true,
            ..Default::default()
        });
        let feedback_loop = FeedbackLoop::new(
            ScriptedPipeline::new(vec![Some("v1")]),
            ScriptedReviewer::new(vec![rejected("no")]),
            FakePublisher::ok(),
            failures,
            1,
        )
        .unwrap();

        let outcome = feedback_loop.run(&seed()).await;
        assert_eq!(outcome.exit_code(), EXIT_EXHAUSTED);
    }

    #[tokio::test]
    async fn test_journal_records_every_attempt() {
        let dir = tempfile::TempDir::new().unwrap();
        let journal = Arc::new(RunJournal::new(dir.path().to_path_buf()).unwrap());
        let feedback_loop = FeedbackLoop::new(
            ScriptedPipeline::new(vec![None, Some("v2")]),
            ScriptedReviewer::new(vec![approved("v2")]),
            FakePublisher::ok(),
            Arc::new(MemoryFailures::default()),
            3,
        )
        .unwrap()
        .with_journal(journal.clone());

        feedback_loop.run(&seed()).await;

        let events = journal.read_today().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                RunEvent::RunStart { .. } => "run_start",
                RunEvent::AttemptStart { .. } => "attempt_start",
                RunEvent::Review { .. } => "review",
                RunEvent::AttemptFailed { .. } => "attempt_failed",
                RunEvent::Published { .. } => "published",
                RunEvent::PublishFailed { .. } => "publish_failed",
                RunEvent::Exhausted { .. } => "exhausted",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "run_start",
                "attempt_start",
                "attempt_failed",
                "attempt_start",
                "review",
                "published"
            ]
        );
    }
}
