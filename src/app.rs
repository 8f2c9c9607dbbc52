// Application wiring
//
// Turns a `Config` into the concrete pipeline, reviewer, publisher and
// stores, and drives a single `quill run` or a `quill mentions` poll.

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::calendar::{ContentCalendar, ContentCategory, ContentPlan, StrategyProgress};
use crate::config::{Config, Persona, SearchConfig};
use crate::engage::{MentionMonitor, PollReport, ReplyStage};
use crate::health::{self, CheckResult, HealthReport};
use crate::logging::RunJournal;
use crate::orchestrator::{FeedbackLoop, FinalOutcome};
use crate::pipeline::{context, GenerationContext, StagePipeline};
use crate::providers::{create_provider, LlmProvider};
use crate::publish::{DryRunPublisher, Publisher, XPublisher};
use crate::review::ReviewStage;
use crate::store::{JsonFailureStore, SqliteAnalyticsStore, SqliteEngagementStore};
use crate::trends::{self, BraveSearch, TrendSource};

/// Flags for `quill run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Calendar day to post for (defaults to the saved progress)
    pub day: Option<u32>,
    /// Custom topic; bypasses the calendar
    pub topic: Option<String>,
    pub category: Option<ContentCategory>,
    pub max_attempts: Option<u32>,
    pub dry_run: bool,
    pub skip_health_check: bool,
}

/// Flags for `quill mentions`
#[derive(Debug, Clone, Default)]
pub struct MentionOptions {
    /// Draft replies without sending them
    pub dry_run: bool,
    /// Override monitor.max_replies
    pub max_replies: Option<usize>,
}

/// Everything a run persists to
pub struct Stores {
    pub failures: Arc<JsonFailureStore>,
    pub analytics: Arc<SqliteAnalyticsStore>,
    pub journal: Arc<RunJournal>,
}

impl Stores {
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            failures: Arc::new(JsonFailureStore::new(config.failed_dir())?),
            analytics: Arc::new(SqliteAnalyticsStore::open(&config.analytics_db_path())?),
            journal: Arc::new(RunJournal::new(config.data_dir.clone())?),
        })
    }
}

/// Pick what to write about.
///
/// Returns the plan and whether it came from the calendar (only calendar
/// runs advance the saved progress). A custom topic without a category gets
/// the weekly rhythm's category for today.
pub fn select_plan<R: Rng + ?Sized>(
    calendar: &ContentCalendar,
    progress: &StrategyProgress,
    options: &RunOptions,
    rng: &mut R,
) -> (ContentPlan, bool) {
    let day = options.day.unwrap_or(progress.current_day);

    match &options.topic {
        Some(topic) => {
            let today = chrono::Local::now();
            let category = options
                .category
                .unwrap_or_else(|| ContentCategory::for_day_of_month(today.day(), rng));
            let plan = ContentPlan {
                day: ContentCalendar::normalize_day(day),
                category,
                topic: topic.clone(),
                theme: calendar.monthly_theme(today.month()).to_string(),
                is_thread: false,
            };
            (plan, false)
        }
        None => {
            let mut plan = calendar.plan_for_day(day);
            if let Some(category) = options.category {
                plan.category = category;
            }
            (plan, options.day.is_none())
        }
    }
}

/// Seed context for every attempt: the plan plus the trend digest
pub fn seed_context(plan: &ContentPlan, trends: &str) -> GenerationContext {
    GenerationContext::from_plan(plan).with_field(context::TRENDS, trends)
}

/// Brave search client when a key is configured
pub fn build_trend_source(config: &SearchConfig) -> Option<BraveSearch> {
    let api_key = config.api_key.as_ref().filter(|k| !k.trim().is_empty())?;
    match BraveSearch::new(api_key.clone(), config.endpoint.clone()) {
        Ok(source) => Some(source),
        Err(e) => {
            tracing::warn!("Trend search disabled: {:#}", e);
            None
        }
    }
}

pub fn build_publisher(config: &Config, dry_run: bool) -> Result<Arc<dyn Publisher>> {
    if dry_run {
        return Ok(Arc::new(DryRunPublisher::new()));
    }

    let token = config
        .publisher
        .access_token
        .as_ref()
        .filter(|t| !t.trim().is_empty())
        .context(
            "No publisher access token configured.\n\n\
             Set publisher.access_token in the config file or export X_ACCESS_TOKEN \
             (use --dry-run to generate without posting).",
        )?;

    let publisher = XPublisher::new(
        token.clone(),
        config.publisher.base_url.clone(),
        Duration::from_secs(config.publisher.timeout_secs),
    )?;
    Ok(Arc::new(publisher))
}

/// Wire the stage pipeline, reviewer, publisher and failure store into a
/// loop. Analytics are attached by the caller for real runs only.
pub fn build_feedback_loop(
    config: &Config,
    persona: Arc<Persona>,
    provider: Arc<dyn LlmProvider>,
    publisher: Arc<dyn Publisher>,
    stores: &Stores,
    max_attempts: u32,
) -> Result<FeedbackLoop> {
    let provider_config = &config.provider;
    let char_limit = config.pipeline.char_limit;

    let pipeline = StagePipeline::new(
        provider.clone(),
        persona.clone(),
        provider_config.stage_model.clone(),
        char_limit,
    )
    .with_sampling(provider_config.max_tokens, provider_config.temperature);

    let reviewer = ReviewStage::new(
        provider,
        persona,
        provider_config.review_model.clone(),
        char_limit,
    )
    .with_sampling(provider_config.max_tokens, provider_config.temperature);

    let feedback_loop = FeedbackLoop::new(
        Arc::new(pipeline),
        Arc::new(reviewer),
        publisher,
        stores.failures.clone(),
        max_attempts,
    )?
    .with_journal(stores.journal.clone());

    Ok(feedback_loop)
}

/// Generate, review and publish one post
pub async fn run(config: &Config, options: RunOptions) -> Result<FinalOutcome> {
    config.require_api_key()?;

    let persona = Arc::new(Persona::load_or_default(config.persona_path.as_deref())?);
    let calendar = ContentCalendar::load_or_builtin(config.calendar_path.as_deref())?;
    let progress_path = config.progress_path();
    let mut progress = StrategyProgress::load_or_init(&progress_path)?;

    let (plan, from_calendar) =
        select_plan(&calendar, &progress, &options, &mut rand::thread_rng());
    tracing::info!(
        day = plan.day,
        category = %plan.category,
        thread = plan.is_thread,
        "Topic: {}",
        plan.topic
    );

    let stores = Stores::open(config)?;
    let publisher = build_publisher(config, options.dry_run)?;

    if options.skip_health_check {
        tracing::warn!("Skipping pre-publish health check");
    } else {
        let checked = if options.dry_run {
            None
        } else {
            Some(publisher.as_ref())
        };
        let report =
            health::pre_publish_check(checked, &stores.analytics, stores.failures.dir()).await;
        if !report.is_healthy() {
            bail!("Pre-publish health check failed:\n{}", report.render());
        }
    }

    let provider = create_provider(&config.provider)?;

    let source = build_trend_source(&config.search);
    let trend_digest = trends::gather_trends(
        source.as_ref().map(|s| s as &dyn TrendSource),
        plan.category,
        config.search.results_per_query,
    )
    .await;
    let seed = seed_context(&plan, &trend_digest);

    let max_attempts = options
        .max_attempts
        .unwrap_or(config.pipeline.max_attempts);
    let mut feedback_loop =
        build_feedback_loop(config, persona, provider, publisher, &stores, max_attempts)?;
    if !options.dry_run {
        feedback_loop = feedback_loop.with_analytics(stores.analytics.clone());
    }

    let outcome = feedback_loop.run(&seed).await;

    if outcome.is_published() && from_calendar && !options.dry_run {
        progress.advance();
        if let Err(e) = progress.save(&progress_path) {
            tracing::warn!("Failed to save strategy progress: {:#}", e);
        }
    }

    Ok(outcome)
}

/// Wire the reply stage, publisher and engagement store into a monitor
pub fn build_monitor(
    config: &Config,
    persona: Arc<Persona>,
    provider: Arc<dyn LlmProvider>,
    publisher: Arc<dyn Publisher>,
    store: Arc<SqliteEngagementStore>,
    options: &MentionOptions,
) -> MentionMonitor {
    let responder = ReplyStage::new(
        provider,
        persona,
        config.provider.review_model.clone(),
        config.pipeline.char_limit,
    )
    .with_sampling(config.provider.max_tokens, config.provider.temperature);

    MentionMonitor::new(publisher, Arc::new(responder), store)
        .with_limits(
            config.monitor.max_results,
            options.max_replies.unwrap_or(config.monitor.max_replies),
        )
        .with_dry_run(options.dry_run)
}

/// Reading mentions always needs the real account, even for a dry run
fn prepare_monitor(config: &Config, options: &MentionOptions) -> Result<MentionMonitor> {
    config.require_api_key()?;

    let persona = Arc::new(Persona::load_or_default(config.persona_path.as_deref())?);
    let store = Arc::new(SqliteEngagementStore::open(&config.analytics_db_path())?);
    let publisher = build_publisher(config, false)?;
    let provider = create_provider(&config.provider)?;

    Ok(build_monitor(config, persona, provider, publisher, store, options))
}

/// Fetch new mentions once and answer the pending ones
pub async fn poll_mentions(config: &Config, options: MentionOptions) -> Result<PollReport> {
    prepare_monitor(config, &options)?.poll().await
}

/// Poll every `monitor.interval_minutes` until Ctrl-C; failed polls are
/// logged and retried on the next tick
pub async fn watch_mentions(config: &Config, options: MentionOptions) -> Result<()> {
    let monitor = prepare_monitor(config, &options)?;

    let period = Duration::from_secs(config.monitor.interval_minutes.max(1) * 60);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(
        "Watching mentions every {} minute(s)",
        config.monitor.interval_minutes
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = monitor.poll().await {
                    tracing::warn!("Mention poll failed: {:#}", e);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Mention monitor stopped");
                return Ok(());
            }
        }
    }
}

/// Standalone health check for `quill check`
pub async fn check(config: &Config) -> Result<HealthReport> {
    let stores = Stores::open(config)?;

    match build_publisher(config, false) {
        Ok(publisher) => Ok(health::pre_publish_check(
            Some(publisher.as_ref()),
            &stores.analytics,
            stores.failures.dir(),
        )
        .await),
        Err(e) => {
            let mut report =
                health::pre_publish_check(None, &stores.analytics, stores.failures.dir()).await;
            report.checks.insert(
                0,
                CheckResult {
                    name: "publisher",
                    ok: false,
                    detail: format!("{:#}", e),
                },
            );
            Ok(report)
        }
    }
}
