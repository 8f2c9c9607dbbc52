// Analytics store: published posts in SQLite

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::sync::Mutex;

use super::AnalyticsStore;
use crate::pipeline::context::{self, GenerationContext};

/// One published post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedRecord {
    pub post_id: String,
    pub content: String,
    pub content_hash: String,
    pub category: Option<String>,
    pub theme: Option<String>,
    pub topic: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub attempts_needed: u32,
}

impl PublishedRecord {
    pub fn new(post_id: String, content: String, ctx: &GenerationContext, attempts_needed: u32) -> Self {
        Self {
            post_id,
            content_hash: hash_content(&content),
            content,
            category: ctx.get(context::CATEGORY).map(str::to_owned),
            theme: ctx.get(context::THEME).map(str::to_owned),
            topic: ctx.get(context::TOPIC).map(str::to_owned),
            posted_at: Utc::now(),
            attempts_needed,
        }
    }
}

/// SHA-256 of the post text, hex encoded
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SqliteAnalyticsStore {
    conn: Mutex<Connection>,
}

impl SqliteAnalyticsStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("schema.sql"))
            .context("Failed to apply analytics schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Cheap query proving the database is readable
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT count(*) FROM sqlite_master WHERE type='table'", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("Analytics database is not readable")?;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row("SELECT count(*) FROM published_posts", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Most recently published posts first
    pub async fn recent(&self, limit: usize) -> Result<Vec<PublishedRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT post_id, content, content_hash, category, theme, topic, posted_at, attempts_needed
             FROM published_posts ORDER BY posted_at DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(post_id, content, content_hash, category, theme, topic, posted_at, attempts)| {
                let posted_at = DateTime::parse_from_rfc3339(&posted_at)
                    .with_context(|| format!("Bad posted_at for {}: {}", post_id, posted_at))?
                    .with_timezone(&Utc);
                Ok(PublishedRecord {
                    post_id,
                    content,
                    content_hash,
                    category,
                    theme,
                    topic,
                    posted_at,
                    attempts_needed: attempts as u32,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn append(&self, record: &PublishedRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO published_posts
                (post_id, content, content_hash, category, theme, topic, posted_at, attempts_needed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.post_id,
                record.content,
                record.content_hash,
                record.category,
                record.theme,
                record.topic,
                record.posted_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                record.attempts_needed as i64,
            ],
        )
        .with_context(|| format!("Failed to record published post {}", record.post_id))?;
        Ok(())
    }
}
