// Pre-publish health check
//
// Cheap probes run before spending tokens on generation: publisher
// credentials, analytics database, failure directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::publish::Publisher;
use crate::store::SqliteAnalyticsStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn from_result(name: &'static str, result: Result<String>) -> Self {
        match result {
            Ok(detail) => Self {
                name,
                ok: true,
                detail,
            },
            Err(e) => Self {
                name,
                ok: false,
                detail: format!("{:#}", e),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.ok)
    }

    /// One line per check, for the CLI
    pub fn render(&self) -> String {
        self.checks
            .iter()
            .map(|c| {
                format!(
                    "{} {:<10} {}",
                    if c.ok { "✓" } else { "✗" },
                    c.name,
                    c.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Probe every dependency a publishing run needs.
///
/// `publisher` is `None` in dry-run mode, where credentials don't matter.
pub async fn pre_publish_check(
    publisher: Option<&dyn Publisher>,
    analytics: &SqliteAnalyticsStore,
    failed_dir: &Path,
) -> HealthReport {
    let mut report = HealthReport::default();

    if let Some(publisher) = publisher {
        let result = publisher
            .verify()
            .await
            .map(|account| format!("{} account {}", publisher.name(), account))
            .map_err(anyhow::Error::from);
        report.checks.push(CheckResult::from_result("publisher", result));
    }

    let result = analytics
        .ping()
        .await
        .map(|_| "database reachable".to_string());
    report.checks.push(CheckResult::from_result("analytics", result));

    let result = check_writable(failed_dir).map(|_| failed_dir.display().to_string());
    report.checks.push(CheckResult::from_result("failed_dir", result));

    for check in report.failures() {
        tracing::warn!("Health check {} failed: {}", check.name, check.detail);
    }

    report
}

fn check_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let probe = dir.join(".quill_write_probe");
    fs::write(&probe, b"ok")
        .with_context(|| format!("Directory not writable: {}", dir.display()))?;
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove probe file: {}", probe.display()))?;
    Ok(())
}
