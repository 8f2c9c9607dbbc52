// Failure records: one pretty-printed JSON file per run awaiting review

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::FailureStore;
use crate::pipeline::GenerationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    /// Every attempt was rejected or crashed
    RequiresManualReview,
    /// Approved content that could not be delivered
    PublishFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    pub status: FailureStatus,
    pub attempts: u32,
    pub last_context: GenerationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Approved text that failed to publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

pub struct JsonFailureStore {
    dir: PathBuf,
}

impl JsonFailureStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create failure directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(record: &FailureRecord) -> String {
        let short_id: String = record.run_id.chars().take(8).collect();
        format!(
            "{}_{}_failed.json",
            record.recorded_at.format("%Y%m%d_%H%M%S"),
            short_id
        )
    }

    /// Write a record and return its path
    pub fn write(&self, record: &FailureRecord) -> Result<PathBuf> {
        let path = self.dir.join(Self::file_name(record));
        let json = serde_json::to_string_pretty(record).context("Failed to serialize failure record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write failure record: {}", path.display()))?;
        Ok(path)
    }

    /// Most recent records first; unreadable files are skipped
    pub fn list(&self, limit: usize) -> Result<Vec<FailureRecord>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read failure directory: {}", self.dir.display()))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_failed.json"))
                .unwrap_or(false);
            if !is_record {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<FailureRecord>(&s).map_err(Into::into));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable failure record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl FailureStore for JsonFailureStore {
    async fn append(&self, record: &FailureRecord) -> Result<()> {
        let path = self.write(record)?;
        tracing::info!("Saved {:?} record to {}", record.status, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(run_id: &str, secs: i64, status: FailureStatus) -> FailureRecord {
        FailureRecord {
            run_id: run_id.to_string(),
            recorded_at: Utc.timestamp_opt(secs, 0).unwrap(),
            status,
            attempts: 3,
            last_context: GenerationContext::new().with_field("topic", "agents"),
            last_feedback: Some("REJECT: too generic".to_string()),
            last_error: None,
            artifact: None,
        }
    }

    #[tokio::test]
    async fn test_append_writes_named_json_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFailureStore::new(dir.path().join("failed")).unwrap();

        let rec = record("0123456789abcdef", 1_725_192_000, FailureStatus::RequiresManualReview);
        store.append(&rec).await.unwrap();

        let path = store.dir().join("20240901_120000_01234567_failed.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "requires_manual_review");
        assert_eq!(json["last_feedback"], "REJECT: too generic");
        assert_eq!(json["last_context"]["fields"]["topic"], "agents");
        assert!(json.get("artifact").is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        let store = JsonFailureStore::new(dir.path().to_path_buf()).unwrap();

        store.append(&record("aaaaaaaa", 1_000, FailureStatus::RequiresManualReview)).await.unwrap();
        store.append(&record("bbbbbbbb", 3_000, FailureStatus::PublishFailed)).await.unwrap();
        store.append(&record("cccccccc", 2_000, FailureStatus::RequiresManualReview)).await.unwrap();
        fs::write(dir.path().join("broken_failed.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let ids: Vec<String> = store.list(10).unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["bbbbbbbb", "cccccccc", "aaaaaaaa"]);

        assert_eq!(store.list(1).unwrap().len(), 1);
    }
}
