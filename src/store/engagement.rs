// Engagement store: mentions seen and replies sent, in SQLite
//
// Shares the analytics database file. A mention is pending until a reply id
// is recorded against it.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tokio::sync::Mutex;

use crate::publish::Mention;

const LAST_MENTION_KEY: &str = "last_mention_id";

/// Mention counts for `quill mentions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementStats {
    pub total: u64,
    pub replied: u64,
    pub pending: u64,
}

pub struct SqliteEngagementStore {
    conn: Mutex<Connection>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteEngagementStore {
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
        conn.execute_batch(include_str!("engagement_schema.sql"))
            .context("Failed to apply engagement schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store a mention; returns false if it was already known
    pub async fn record(&self, mention: &Mention) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO mentions
                    (post_id, author_id, author_username, content, in_reply_to, created_at, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    mention.id,
                    mention.author_id,
                    mention.author_username,
                    mention.text,
                    mention.in_reply_to,
                    mention.created_at.map(timestamp),
                    timestamp(Utc::now()),
                ],
            )
            .with_context(|| format!("Failed to record mention {}", mention.id))?;
        Ok(inserted > 0)
    }

    /// Mentions without a reply, oldest first
    pub async fn pending(&self, limit: usize) -> Result<Vec<Mention>> {
        let conn = self.conn.lock().await;
        // Post ids are snowflakes: shorter is older, then lexical order
        let mut stmt = conn.prepare(
            "SELECT post_id, author_id, author_username, content, in_reply_to, created_at
             FROM mentions WHERE reply_id IS NULL
             ORDER BY length(post_id), post_id LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, author_id, author_username, text, in_reply_to, created_at)| {
                let created_at = created_at
                    .map(|raw| {
                        DateTime::parse_from_rfc3339(&raw)
                            .map(|t| t.with_timezone(&Utc))
                            .with_context(|| format!("Bad created_at for {}: {}", id, raw))
                    })
                    .transpose()?;
                Ok(Mention {
                    id,
                    author_id,
                    author_username,
                    text,
                    created_at,
                    in_reply_to,
                })
            })
            .collect()
    }

    pub async fn mark_replied(&self, post_id: &str, reply_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE mentions SET reply_id = ?2, replied_at = ?3 WHERE post_id = ?1",
                params![post_id, reply_id, timestamp(Utc::now())],
            )
            .with_context(|| format!("Failed to mark mention {} replied", post_id))?;
        if updated == 0 {
            anyhow::bail!("Unknown mention {}", post_id);
        }
        Ok(())
    }

    /// Newest mention id fetched so far (the `since_id` of the next poll)
    pub async fn last_seen_id(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM monitor_state WHERE key = ?1",
                params![LAST_MENTION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub async fn set_last_seen_id(&self, post_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO monitor_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_MENTION_KEY, post_id],
        )
        .context("Failed to save last mention id")?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<EngagementStats> {
        let conn = self.conn.lock().await;
        let (total, replied): (i64, i64) = conn.query_row(
            "SELECT count(*), count(reply_id) FROM mentions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(EngagementStats {
            total: total as u64,
            replied: replied as u64,
            pending: (total - replied) as u64,
        })
    }
}
