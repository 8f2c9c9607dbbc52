// Quill - feedback-driven social post pipeline
// Main entry point

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use quill::app::{self, MentionOptions, RunOptions};
use quill::calendar::{ContentCalendar, ContentCategory, StrategyProgress};
use quill::config::{load_config, load_config_from, Config};
use quill::logging::init_logging;
use quill::metrics;
use quill::orchestrator::FinalOutcome;
use quill::store::{JsonFailureStore, SqliteAnalyticsStore, SqliteEngagementStore};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Research, compose, review and publish one social post per day")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.quill/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for quill
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, review and publish a post
    Run(RunArgs),

    /// Show today's plan, the upcoming days and strategy progress
    Calendar {
        /// Number of days to preview
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Reply to new mentions of the account
    Mentions(MentionArgs),

    /// Verify publisher credentials and local stores
    Check,

    /// List runs waiting for manual review
    Failures {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List recently published posts
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Calendar day (1-30) instead of the saved progress
    #[arg(long)]
    day: Option<u32>,

    /// Custom topic instead of the calendar's
    #[arg(long)]
    topic: Option<String>,

    /// Content category (e.g. hot_take_opinion)
    #[arg(long)]
    category: Option<ContentCategory>,

    /// Override pipeline.max_attempts
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Generate and review, but don't post
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    skip_health_check: bool,

    /// Write Prometheus metrics here when the run ends
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

#[derive(Args)]
struct MentionArgs {
    /// Keep polling every monitor.interval_minutes until Ctrl-C
    #[arg(long)]
    watch: bool,

    /// Draft replies and log them, but don't send
    #[arg(long)]
    dry_run: bool,

    /// Override monitor.max_replies
    #[arg(long)]
    max_replies: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Calendar { days } => {
            show_calendar(&config, days)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Mentions(args) => {
            mentions(&config, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let report = app::check(&config).await?;
            println!("{}", report.render());
            Ok(if report.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Failures { limit } => {
            show_failures(&config, limit)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::History { limit } => {
            show_history(&config, limit).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &Config, args: RunArgs) -> Result<ExitCode> {
    if args.metrics_file.is_some() {
        metrics::init_metrics()?;
    }

    let options = RunOptions {
        day: args.day,
        topic: args.topic,
        category: args.category,
        max_attempts: args.max_attempts,
        dry_run: args.dry_run,
        skip_health_check: args.skip_health_check,
    };

    let outcome = app::run(config, options).await?;
    print_outcome(&outcome, &config.failed_dir());

    if let Some(path) = &args.metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            tracing::warn!("Failed to write metrics file: {:#}", e);
        }
    }

    Ok(ExitCode::from(outcome.exit_code()))
}

async fn mentions(config: &Config, args: MentionArgs) -> Result<()> {
    let options = MentionOptions {
        dry_run: args.dry_run,
        max_replies: args.max_replies,
    };

    if args.watch {
        return app::watch_mentions(config, options).await;
    }

    let report = app::poll_mentions(config, options).await?;
    println!(
        "{} mention(s) fetched, {} new; {} replied, {} drafted, {} failed",
        report.fetched, report.new, report.replied, report.drafted, report.failed
    );
    if report.rate_limited {
        println!("Rate limited: remaining replies wait for the next poll");
    }

    let stats = SqliteEngagementStore::open(&config.analytics_db_path())?
        .stats()
        .await?;
    println!(
        "{} mention(s) tracked, {} still waiting for a reply",
        stats.total, stats.pending
    );
    Ok(())
}

fn print_outcome(outcome: &FinalOutcome, failed_dir: &Path) {
    match outcome {
        FinalOutcome::Published {
            artifact,
            post_id,
            attempt_count,
        } => {
            println!(
                "✓ Published {} after {} attempt(s) ({} chars)\n\n{}",
                post_id,
                attempt_count,
                artifact.chars().count(),
                artifact
            );
        }
        FinalOutcome::ExhaustedRetries {
            last_feedback,
            attempt_count,
            ..
        } => {
            println!(
                "✗ No post approved after {} attempt(s); saved to {} for manual review",
                attempt_count,
                failed_dir.display()
            );
            if let Some(feedback) = last_feedback {
                println!("\nLast feedback:\n{}", feedback);
            }
        }
        FinalOutcome::PublishFailed {
            artifact,
            error,
            ..
        } => {
            println!(
                "✗ Approved post could not be published: {}\n  saved to {}\n\n{}",
                error,
                failed_dir.display(),
                artifact
            );
        }
    }
}

fn show_calendar(config: &Config, days: u32) -> Result<()> {
    let calendar = ContentCalendar::load_or_builtin(config.calendar_path.as_deref())?;
    let progress = StrategyProgress::load_or_init(&config.progress_path())?;
    let status = progress.status();

    let today = calendar.plan_for_day(progress.current_day);
    println!("Day {} [{}] {}", today.day, today.category, today.topic);
    println!("Theme: {}", today.theme);
    if today.is_thread {
        println!("Thread day");
    }

    if days > 1 {
        println!("\nUpcoming:");
        for plan in calendar.preview(progress.current_day + 1, days - 1) {
            println!(
                "  {:>2}  {:<22} {}{}",
                plan.day,
                plan.category.as_str(),
                plan.topic,
                if plan.is_thread { " (thread)" } else { "" }
            );
        }
    }

    println!(
        "\nProgress: {}/30 days complete ({:.0}%), {} remaining",
        status.completed_days, status.progress_percentage, status.remaining_days
    );
    Ok(())
}

fn show_failures(config: &Config, limit: usize) -> Result<()> {
    let store = JsonFailureStore::new(config.failed_dir())?;
    let records = store.list(limit)?;

    if records.is_empty() {
        println!("No failed runs in {}", store.dir().display());
        return Ok(());
    }

    for record in records {
        let topic = record
            .last_context
            .get(quill::pipeline::context::TOPIC)
            .unwrap_or("-");
        println!(
            "{}  {:?}  {} attempt(s)  {}",
            record.recorded_at.format("%Y-%m-%d %H:%M"),
            record.status,
            record.attempts,
            topic
        );
        if let Some(feedback) = &record.last_feedback {
            println!("    feedback: {}", feedback.lines().next().unwrap_or_default());
        }
        if let Some(error) = &record.last_error {
            println!("    error: {}", error);
        }
    }
    Ok(())
}

async fn show_history(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteAnalyticsStore::open(&config.analytics_db_path())?;
    let records = store.recent(limit).await?;

    if records.is_empty() {
        println!("No published posts yet");
        return Ok(());
    }

    println!("{} post(s) published in total\n", store.count().await?);
    for record in records {
        println!(
            "{}  {}  ({} attempt(s))\n    {}",
            record.posted_at.format("%Y-%m-%d %H:%M"),
            record.post_id,
            record.attempts_needed,
            record.content.replace('\n', " ")
        );
    }
    Ok(())
}
