// Mention monitoring
//
// Each poll fetches mentions newer than the last one seen, stores them, then
// drafts and sends replies to the oldest pending ones. A mention stays
// pending until a reply is sent, so failed drafts are retried on the next
// poll.

mod reply;

pub use reply::ReplyStage;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::constants::{DEFAULT_MENTIONS_PER_POLL, DEFAULT_REPLIES_PER_POLL};
use crate::metrics;
use crate::publish::{newest_post_id, Mention, PublishError, Publisher};
use crate::store::SqliteEngagementStore;

/// Anything that can draft a reply to a mention
#[async_trait]
pub trait Responder: Send + Sync {
    /// `parent` is the text of the post the mention replies to, when known
    async fn respond(&self, mention: &Mention, parent: Option<&str>) -> Result<String>;
}

/// What one poll did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub fetched: usize,
    pub new: usize,
    pub replied: usize,
    /// Replies drafted but not sent (dry run)
    pub drafted: usize,
    pub failed: usize,
    /// The platform rate-limited a reply; the rest of the round was skipped
    pub rate_limited: bool,
}

pub struct MentionMonitor {
    publisher: Arc<dyn Publisher>,
    responder: Arc<dyn Responder>,
    store: Arc<SqliteEngagementStore>,
    max_results: u32,
    max_replies: usize,
    dry_run: bool,
}

impl MentionMonitor {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        responder: Arc<dyn Responder>,
        store: Arc<SqliteEngagementStore>,
    ) -> Self {
        Self {
            publisher,
            responder,
            store,
            max_results: DEFAULT_MENTIONS_PER_POLL,
            max_replies: DEFAULT_REPLIES_PER_POLL,
            dry_run: false,
        }
    }

    pub fn with_limits(mut self, max_results: u32, max_replies: usize) -> Self {
        self.max_results = max_results;
        self.max_replies = max_replies;
        self
    }

    /// Draft replies and log them instead of sending; mentions stay pending
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn poll(&self) -> Result<PollReport> {
        let account = self
            .publisher
            .verify()
            .await
            .context("Failed to verify publisher account")?;

        let mut report = PollReport::default();
        self.collect(&account, &mut report).await?;
        self.respond_pending(&mut report).await?;

        tracing::info!(
            fetched = report.fetched,
            new = report.new,
            replied = report.replied,
            drafted = report.drafted,
            failed = report.failed,
            "Mention poll complete"
        );
        Ok(report)
    }

    async fn collect(&self, account: &str, report: &mut PollReport) -> Result<()> {
        let since = self.store.last_seen_id().await?;
        let mentions = self
            .publisher
            .mentions(account, since.as_deref(), self.max_results)
            .await
            .context("Failed to fetch mentions")?;
        report.fetched = mentions.len();

        for mention in &mentions {
            if mention.author_id == account {
                tracing::debug!("Skipping own post {}", mention.id);
                continue;
            }
            if self.store.record(mention).await? {
                report.new += 1;
            }
        }

        let ids = mentions.iter().map(|m| m.id.as_str()).chain(since.as_deref());
        if let Some(newest) = newest_post_id(ids) {
            if since.as_deref() != Some(newest) {
                self.store.set_last_seen_id(newest).await?;
            }
        }
        Ok(())
    }

    async fn respond_pending(&self, report: &mut PollReport) -> Result<()> {
        if self.max_replies == 0 {
            return Ok(());
        }

        for mention in self.store.pending(self.max_replies).await? {
            let parent = match &mention.in_reply_to {
                Some(id) => self.publisher.post_text(id).await.unwrap_or_else(|e| {
                    tracing::warn!("Could not read post {}: {}", id, e);
                    None
                }),
                None => None,
            };

            let text = match self.responder.respond(&mention, parent.as_deref()).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(mention = %mention.id, "Failed to draft reply: {:#}", e);
                    metrics::record_reply("failed");
                    report.failed += 1;
                    continue;
                }
            };

            if self.dry_run {
                tracing::info!("[dry run] reply to {}: {}", mention.author_handle(), text);
                metrics::record_reply("drafted");
                report.drafted += 1;
                continue;
            }

            match self.publisher.reply(&text, &mention.id).await {
                Ok(post) => {
                    if let Err(e) = self.store.mark_replied(&mention.id, &post.id).await {
                        tracing::error!("Reply {} sent but not recorded: {:#}", post.id, e);
                    }
                    tracing::info!("Replied to {} ({})", mention.author_handle(), post.id);
                    metrics::record_reply("sent");
                    report.replied += 1;
                }
                Err(e @ PublishError::RateLimited { .. }) => {
                    tracing::warn!("Stopping replies for this poll: {}", e);
                    metrics::record_reply("failed");
                    report.failed += 1;
                    report.rate_limited = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(mention = %mention.id, "Failed to send reply: {}", e);
                    metrics::record_reply("failed");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishedPost;
    use anyhow::bail;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ACCOUNT: &str = "42";

    fn mention(id: &str, author: &str) -> Mention {
        Mention {
            id: id.to_string(),
            author_id: author.to_string(),
            author_username: None,
            text: format!("@quill question {}", id),
            created_at: None,
            in_reply_to: None,
        }
    }

    /// Serves a fixed mention timeline and records replies
    #[derive(Default)]
    struct FakeAccount {
        timeline: Vec<Mention>,
        posts: HashMap<String, String>,
        rate_limit_replies: bool,
        since_seen: Mutex<Vec<Option<String>>>,
        replies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Publisher for FakeAccount {
        async fn publish(&self, text: &str) -> Result<PublishedPost, PublishError> {
            Ok(PublishedPost {
                id: "p".to_string(),
                text: text.to_string(),
            })
        }

        async fn reply(&self, text: &str, in_reply_to: &str) -> Result<PublishedPost, PublishError> {
            if self.rate_limit_replies {
                return Err(PublishError::RateLimited { reset_at: None });
            }
            let mut replies = self.replies.lock().unwrap();
            replies.push((in_reply_to.to_string(), text.to_string()));
            Ok(PublishedPost {
                id: format!("r{}", replies.len()),
                text: text.to_string(),
            })
        }

        async fn mentions(
            &self,
            account_id: &str,
            since_id: Option<&str>,
            _max_results: u32,
        ) -> Result<Vec<Mention>, PublishError> {
            assert_eq!(account_id, ACCOUNT);
            self.since_seen
                .lock()
                .unwrap()
                .push(since_id.map(str::to_owned));
            let newer = |m: &&Mention| match since_id {
                Some(since) => newest_post_id([m.id.as_str(), since]) != Some(since),
                None => true,
            };
            Ok(self.timeline.iter().filter(newer).cloned().collect())
        }

        async fn post_text(&self, post_id: &str) -> Result<Option<String>, PublishError> {
            Ok(self.posts.get(post_id).cloned())
        }

        async fn verify(&self) -> Result<String, PublishError> {
            Ok(ACCOUNT.to_string())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Replies "re <id>"; fails for mentions listed in `fail_on`
    #[derive(Default)]
    struct EchoResponder {
        fail_on: Vec<String>,
        parents: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl Responder for EchoResponder {
        async fn respond(&self, mention: &Mention, parent: Option<&str>) -> Result<String> {
            self.parents.lock().unwrap().push(parent.map(str::to_owned));
            if self.fail_on.contains(&mention.id) {
                bail!("provider unavailable");
            }
            Ok(format!("re {}", mention.id))
        }
    }

    fn monitor(
        account: Arc<FakeAccount>,
        responder: Arc<EchoResponder>,
    ) -> (MentionMonitor, Arc<SqliteEngagementStore>) {
        let store = Arc::new(SqliteEngagementStore::open_in_memory().unwrap());
        let monitor = MentionMonitor::new(account, responder, store.clone());
        (monitor, store)
    }

    #[tokio::test]
    async fn test_replies_oldest_first_and_advances_since_id() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("103", "7"), mention("101", "8")],
            ..Default::default()
        });
        let (monitor, store) = monitor(account.clone(), Arc::new(EchoResponder::default()));

        let report = monitor.poll().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.new, 2);
        assert_eq!(report.replied, 2);
        assert_eq!(
            *account.replies.lock().unwrap(),
            vec![
                ("101".to_string(), "re 101".to_string()),
                ("103".to_string(), "re 103".to_string())
            ]
        );
        assert_eq!(store.last_seen_id().await.unwrap().as_deref(), Some("103"));

        let report = monitor.poll().await.unwrap();
        assert_eq!(report, PollReport::default());
        assert_eq!(
            *account.since_seen.lock().unwrap(),
            vec![None, Some("103".to_string())]
        );
        assert_eq!(account.replies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_own_posts_are_not_answered() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("105", ACCOUNT), mention("104", "7")],
            ..Default::default()
        });
        let (monitor, store) = monitor(account.clone(), Arc::new(EchoResponder::default()));

        let report = monitor.poll().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.new, 1);
        assert_eq!(report.replied, 1);
        assert_eq!(store.last_seen_id().await.unwrap().as_deref(), Some("105"));
    }

    #[tokio::test]
    async fn test_failed_draft_stays_pending_for_next_poll() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("201", "7")],
            ..Default::default()
        });
        let responder = Arc::new(EchoResponder {
            fail_on: vec!["201".to_string()],
            ..Default::default()
        });
        let (monitor, store) = monitor(account.clone(), responder);

        let report = monitor.poll().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.replied, 0);
        assert_eq!(store.stats().await.unwrap().pending, 1);

        // Same pending mention, a responder that works this time
        let retry = MentionMonitor::new(
            account.clone(),
            Arc::new(EchoResponder::default()),
            store.clone(),
        );
        let report = retry.poll().await.unwrap();
        assert_eq!(report.new, 0);
        assert_eq!(report.replied, 1);
        assert_eq!(store.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_ends_the_round() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("302", "7"), mention("301", "8")],
            rate_limit_replies: true,
            ..Default::default()
        });
        let responder = Arc::new(EchoResponder::default());
        let (monitor, store) = monitor(account, responder.clone());

        let report = monitor.poll().await.unwrap();
        assert!(report.rate_limited);
        assert_eq!(report.failed, 1);
        assert_eq!(responder.parents.lock().unwrap().len(), 1);
        assert_eq!(store.stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_dry_run_drafts_without_sending() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("401", "7")],
            ..Default::default()
        });
        let (monitor, store) = monitor(account.clone(), Arc::new(EchoResponder::default()));
        let monitor = monitor.with_dry_run(true);

        let report = monitor.poll().await.unwrap();
        assert_eq!(report.drafted, 1);
        assert_eq!(report.replied, 0);
        assert!(account.replies.lock().unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_parent_post_text_reaches_responder() {
        let mut reply = mention("502", "7");
        reply.in_reply_to = Some("90".to_string());
        let mut orphan = mention("501", "8");
        orphan.in_reply_to = Some("91".to_string());

        let account = Arc::new(FakeAccount {
            timeline: vec![reply, orphan],
            posts: HashMap::from([("90".to_string(), "Automate one report a week".to_string())]),
            ..Default::default()
        });
        let responder = Arc::new(EchoResponder::default());
        let (monitor, _) = monitor(account, responder.clone());

        monitor.poll().await.unwrap();
        assert_eq!(
            *responder.parents.lock().unwrap(),
            vec![None, Some("Automate one report a week".to_string())]
        );
    }

    #[tokio::test]
    async fn test_zero_reply_budget_only_collects() {
        let account = Arc::new(FakeAccount {
            timeline: vec![mention("601", "7")],
            ..Default::default()
        });
        let (monitor, store) = monitor(account.clone(), Arc::new(EchoResponder::default()));
        let monitor = monitor.with_limits(10, 0);

        let report = monitor.poll().await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(report.replied, 0);
        assert_eq!(store.stats().await.unwrap().pending, 1);
    }
}
