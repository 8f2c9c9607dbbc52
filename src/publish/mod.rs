// Social publishing
//
// `Publisher` is the delivery seam: the X API v2 client for real runs and a
// dry-run publisher that only logs. Besides posting it reads the account's
// mentions and replies to them.

mod dry_run;
mod x;

pub use dry_run::DryRunPublisher;
pub use x::XPublisher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a post could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("publish credentials rejected: {0}")]
    Unauthorized(String),

    #[error("rate limited{}", .reset_at.map(|t| format!(" until {}", t.to_rfc3339())).unwrap_or_default())]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Content refused by the platform (oversized, duplicate, ...)
    #[error("post rejected by platform: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("publish API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// A successfully published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    pub text: String,
}

/// A post that mentions the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Post this mention replies to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl Mention {
    /// `@username` when known, the numeric author id otherwise
    pub fn author_handle(&self) -> String {
        match &self.author_username {
            Some(name) => format!("@{}", name),
            None => format!("user {}", self.author_id),
        }
    }
}

/// Newest of a set of numeric post ids (longer id means newer)
pub fn newest_post_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    ids.into_iter().max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<PublishedPost, PublishError>;

    /// Post `text` as a reply to `in_reply_to`
    async fn reply(&self, text: &str, in_reply_to: &str) -> Result<PublishedPost, PublishError>;

    /// Mentions of `account_id` newer than `since_id`, newest first.
    ///
    /// Publishers without read access report none.
    async fn mentions(
        &self,
        _account_id: &str,
        _since_id: Option<&str>,
        _max_results: u32,
    ) -> Result<Vec<Mention>, PublishError> {
        Ok(Vec::new())
    }

    /// Text of an existing post; `None` when it is gone or unreadable
    async fn post_text(&self, _post_id: &str) -> Result<Option<String>, PublishError> {
        Ok(None)
    }

    /// Check credentials; returns the account id
    async fn verify(&self) -> Result<String, PublishError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rate_limit_display() {
        let reset = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();
        let err = PublishError::RateLimited {
            reset_at: Some(reset),
        };
        assert_eq!(err.to_string(), "rate limited until 2024-09-01T12:00:00+00:00");
        assert_eq!(
            PublishError::RateLimited { reset_at: None }.to_string(),
            "rate limited"
        );
    }

    #[test]
    fn test_newest_post_id_compares_numerically() {
        let ids = ["999", "1830000000000000001", "1830000000000000000"];
        assert_eq!(newest_post_id(ids), Some("1830000000000000001"));
        assert_eq!(newest_post_id(["99", "100"]), Some("100"));
        assert_eq!(newest_post_id(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_author_handle() {
        let mut mention = Mention {
            id: "1".to_string(),
            author_id: "42".to_string(),
            author_username: None,
            text: "@quill hi".to_string(),
            created_at: None,
            in_reply_to: None,
        };
        assert_eq!(mention.author_handle(), "user 42");
        mention.author_username = Some("ada".to_string());
        assert_eq!(mention.author_handle(), "@ada");
    }
}
