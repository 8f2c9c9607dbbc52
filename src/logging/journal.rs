// Run journal: pipeline events to <data_dir>/runs_YYYY-MM-DD.jsonl

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// An event in the life of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart {
        run_id: String,
        topic: Option<String>,
        category: Option<String>,
        max_attempts: u32,
    },
    AttemptStart {
        run_id: String,
        attempt: u32,
        with_feedback: bool,
    },
    Review {
        run_id: String,
        attempt: u32,
        decision: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    AttemptFailed {
        run_id: String,
        attempt: u32,
        error: String,
    },
    Published {
        run_id: String,
        attempt_count: u32,
        post_id: String,
    },
    PublishFailed {
        run_id: String,
        attempt_count: u32,
        error: String,
    },
    Exhausted {
        run_id: String,
        attempt_count: u32,
    },
}

#[derive(Debug, Serialize)]
struct JournalLine<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a RunEvent,
}

/// Writes run events to a daily JSONL file
pub struct RunJournal {
    dir: PathBuf,
}

impl RunJournal {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn log(&self, event: &RunEvent) -> Result<()> {
        let path = self.today_path();
        let line = JournalLine {
            ts: Utc::now().to_rfc3339(),
            event,
        };
        let json = serde_json::to_string(&line).context("Failed to serialize run event")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open run journal: {}", path.display()))?;

        writeln!(file, "{}", json).context("Failed to write run event")?;
        Ok(())
    }

    /// Path to today's journal file
    pub fn today_path(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d").to_string();
        self.dir.join(format!("runs_{}.jsonl", date))
    }

    /// Events recorded today, oldest first
    pub fn read_today(&self) -> Result<Vec<RunEvent>> {
        let path = self.today_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run journal: {}", path.display()))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Failed to parse run event"))
            .collect()
    }
}
