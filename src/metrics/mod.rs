// Run metrics
//
// Process-wide Prometheus counters and histograms for the feedback loop.
// Call `init_metrics` once at startup; every `record_*` helper is a no-op
// until then, so library users and tests never need a registry.
//
// | Name | Type | Labels |
// |------|------|--------|
// | `quill_attempts_total` | Counter | |
// | `quill_reviews_total` | Counter | `decision` |
// | `quill_stage_failures_total` | Counter | `stage` |
// | `quill_outcomes_total` | Counter | `outcome` |
// | `quill_stage_duration_seconds` | Histogram | `stage` |
// | `quill_replies_total` | Counter | `result` |

use anyhow::{Context, Result};
use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

struct Metrics {
    registry: Registry,
    attempts_total: IntCounter,
    reviews_total: IntCounterVec,
    stage_failures_total: IntCounterVec,
    outcomes_total: IntCounterVec,
    stage_duration: HistogramVec,
    replies_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn register<C>(registry: &Registry, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .context("metrics registration failed")?;
    Ok(collector)
}

/// Register all quill metrics in a private registry.
///
/// Calling it again after a successful init is a no-op.
pub fn init_metrics() -> Result<()> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let attempts_total = register(
        &registry,
        IntCounter::new("quill_attempts_total", "Generate/review attempts started")?,
    )?;
    let reviews_total = register(
        &registry,
        IntCounterVec::new(
            Opts::new("quill_reviews_total", "Review verdicts by decision"),
            &["decision"],
        )?,
    )?;
    let stage_failures_total = register(
        &registry,
        IntCounterVec::new(
            Opts::new("quill_stage_failures_total", "Stage errors that ended an attempt"),
            &["stage"],
        )?,
    )?;
    let outcomes_total = register(
        &registry,
        IntCounterVec::new(
            Opts::new("quill_outcomes_total", "Terminal run outcomes"),
            &["outcome"],
        )?,
    )?;
    let stage_duration = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                "quill_stage_duration_seconds",
                "Wall-clock duration of each stage call",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
            &["stage"],
        )?,
    )?;

    let replies_total = register(
        &registry,
        IntCounterVec::new(
            Opts::new("quill_replies_total", "Mention replies by result"),
            &["result"],
        )?,
    )?;

    // A concurrent init registers identical descriptors; first one wins.
    let _ = METRICS.set(Metrics {
        registry,
        attempts_total,
        reviews_total,
        stage_failures_total,
        outcomes_total,
        stage_duration,
        replies_total,
    });

    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

pub fn record_attempt() {
    if let Some(m) = metrics() {
        m.attempts_total.inc();
    }
}

/// Count a reviewer verdict (`approved` / `rejected`).
pub fn record_review(decision: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.reviews_total.get_metric_with_label_values(&[decision]) {
            c.inc();
        }
    }
}

pub fn record_stage_failure(stage: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.stage_failures_total.get_metric_with_label_values(&[stage]) {
            c.inc();
        }
    }
}

/// Count a terminal outcome (`published`, `exhausted_retries`, `publish_failed`).
pub fn record_outcome(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.outcomes_total.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

pub fn record_stage_duration(stage: &str, secs: f64) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.stage_duration.get_metric_with_label_values(&[stage]) {
            h.observe(secs);
        }
    }
}

/// Count a mention reply (`sent`, `drafted`, `failed`).
pub fn record_reply(result: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.replies_total.get_metric_with_label_values(&[result]) {
            c.inc();
        }
    }
}

/// Encode every registered metric in the Prometheus text exposition format.
///
/// Returns an empty string when metrics were never initialised.
pub fn gather_text() -> Result<String> {
    let Some(m) = metrics() else {
        return Ok(String::new());
    };

    let families = m.registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output was not UTF-8")
}

/// Write the current metrics to `path` for a node_exporter textfile collector.
///
/// Writes to a sibling temp file first, then renames, so the collector never
/// reads a half-written file.
pub fn write_textfile(path: &Path) -> Result<()> {
    let text = gather_text()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create metrics directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, text)
        .with_context(|| format!("Failed to write metrics file: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics file into place: {}", path.display()))?;

    Ok(())
}
