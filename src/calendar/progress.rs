// Strategy progress tracking
//
// Which calendar day comes next, persisted as JSON next to the other run data.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::CALENDAR_DAYS;

/// Progress through the 30-day calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProgress {
    pub start_date: DateTime<Utc>,
    pub current_day: u32,
    #[serde(default)]
    pub completed_days: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Summary shown by `quill calendar`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStatus {
    pub current_day: u32,
    pub completed_days: usize,
    pub remaining_days: u32,
    pub progress_percentage: f64,
}

impl Default for StrategyProgress {
    fn default() -> Self {
        Self {
            start_date: Utc::now(),
            current_day: 1,
            completed_days: Vec::new(),
            last_updated: None,
        }
    }
}

impl StrategyProgress {
    /// Read the progress file, creating it on first use
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let progress = Self::default();
            progress.save(path)?;
            tracing::info!("Started new content strategy at {}", path.display());
            return Ok(progress);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read progress file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse progress file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write progress file {}", path.display()))
    }

    /// Mark the current day done and move on; stays on the last day once reached
    pub fn advance(&mut self) {
        if !self.completed_days.contains(&self.current_day) {
            self.completed_days.push(self.current_day);
        }
        self.current_day = self.current_day.saturating_add(1).min(CALENDAR_DAYS);
        self.last_updated = Some(Utc::now());
    }

    pub fn status(&self) -> StrategyStatus {
        let completed = self.completed_days.len();
        StrategyStatus {
            current_day: self.current_day,
            completed_days: completed,
            remaining_days: (CALENDAR_DAYS + 1).saturating_sub(self.current_day),
            progress_percentage: completed as f64 / CALENDAR_DAYS as f64 * 100.0,
        }
    }
}
