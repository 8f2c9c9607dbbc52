// Dry-run publisher: logs instead of posting

use async_trait::async_trait;
use std::sync::Mutex;

use super::{PublishError, PublishedPost, Publisher};

#[derive(Default)]
pub struct DryRunPublisher {
    published: Mutex<Vec<String>>,
    replies: Mutex<Vec<(String, String)>>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts "published" so far
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|posts| posts.clone())
            .unwrap_or_default()
    }

    /// `(in_reply_to, text)` pairs "sent" so far
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies
            .lock()
            .map(|replies| replies.clone())
            .unwrap_or_default()
    }
}

fn synthetic_id() -> String {
    format!("dry-run-{}", uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, text: &str) -> Result<PublishedPost, PublishError> {
        let id = synthetic_id();
        tracing::info!("[dry run] would publish {} chars as {}", text.chars().count(), id);

        if let Ok(mut posts) = self.published.lock() {
            posts.push(text.to_string());
        }

        Ok(PublishedPost {
            id,
            text: text.to_string(),
        })
    }

    async fn reply(&self, text: &str, in_reply_to: &str) -> Result<PublishedPost, PublishError> {
        let id = synthetic_id();
        tracing::info!("[dry run] would reply to {}: {}", in_reply_to, text);

        if let Ok(mut replies) = self.replies.lock() {
            replies.push((in_reply_to.to_string(), text.to_string()));
        }

        Ok(PublishedPost {
            id,
            text: text.to_string(),
        })
    }

    async fn verify(&self) -> Result<String, PublishError> {
        Ok("dry-run".to_string())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
