// X (Twitter) API v2 publisher
//
// OAuth 2.0 user-context bearer token. POST /2/tweets to publish and reply,
// GET /2/users/:id/mentions and /2/tweets/:id to read, GET /2/users/me to
// verify credentials.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Mention, PublishError, PublishedPost, Publisher};

/// X accepts 5..=100 results per mentions page
const MENTIONS_PAGE_MIN: u32 = 5;
const MENTIONS_PAGE_MAX: u32 = 100;

pub struct XPublisher {
    client: Client,
    access_token: String,
    base_url: String,
}

#[derive(Serialize)]
struct CreatePost<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTarget<'a>>,
}

#[derive(Serialize)]
struct ReplyTarget<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// Lookups answer 200 with only `errors` when the post is gone
#[derive(Deserialize)]
struct MaybeData<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct MentionPage {
    #[serde(default)]
    data: Vec<ApiPost>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Deserialize)]
struct ApiPost {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    referenced_tweets: Vec<Reference>,
}

#[derive(Deserialize)]
struct Reference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

impl MentionPage {
    fn into_mentions(self) -> Vec<Mention> {
        let users = self.includes.users;
        self.data
            .into_iter()
            .map(|post| {
                let author_id = post.author_id.unwrap_or_default();
                let author_username = users
                    .iter()
                    .find(|u| u.id == author_id && !u.username.is_empty())
                    .map(|u| u.username.clone());
                let in_reply_to = post
                    .referenced_tweets
                    .into_iter()
                    .find(|r| r.kind == "replied_to")
                    .map(|r| r.id);
                Mention {
                    id: post.id,
                    author_id,
                    author_username,
                    text: post.text,
                    created_at: post.created_at,
                    in_reply_to,
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct CreatedPost {
    id: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    username: String,
}

impl XPublisher {
    pub fn new(access_token: String, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn create_post(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
    ) -> Result<PublishedPost, PublishError> {
        let body = CreatePost {
            text,
            reply: in_reply_to.map(|id| ReplyTarget {
                in_reply_to_tweet_id: id,
            }),
        };

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let created: DataEnvelope<CreatedPost> = response.json().await.map_err(transport)?;
        Ok(PublishedPost {
            id: created.data.id,
            text: if created.data.text.is_empty() {
                text.to_string()
            } else {
                created.data.text
            },
        })
    }
}

fn transport(e: reqwest::Error) -> PublishError {
    PublishError::Transport(e.to_string())
}

fn rate_limit_reset(response: &Response) -> Option<DateTime<Utc>> {
    let secs: i64 = response
        .headers()
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Map a non-success response onto a `PublishError`
async fn error_for(response: Response) -> PublishError {
    let status = response.status();
    let reset_at = rate_limit_reset(&response);
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimited { reset_at },
        StatusCode::UNAUTHORIZED => PublishError::Unauthorized(body),
        // X answers 403 both for missing write scope and for duplicate content
        StatusCode::FORBIDDEN if body.to_lowercase().contains("duplicate") => {
            PublishError::Rejected(body)
        }
        StatusCode::FORBIDDEN => PublishError::Unauthorized(body),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => PublishError::Rejected(body),
        _ => PublishError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, text: &str) -> Result<PublishedPost, PublishError> {
        let post = self.create_post(text, None).await?;
        tracing::info!("Published post {}", post.id);
        Ok(post)
    }

    async fn reply(&self, text: &str, in_reply_to: &str) -> Result<PublishedPost, PublishError> {
        let post = self.create_post(text, Some(in_reply_to)).await?;
        tracing::info!("Replied to {} with {}", in_reply_to, post.id);
        Ok(post)
    }

    async fn mentions(
        &self,
        account_id: &str,
        since_id: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<Mention>, PublishError> {
        let mut query = vec![
            (
                "max_results",
                max_results
                    .clamp(MENTIONS_PAGE_MIN, MENTIONS_PAGE_MAX)
                    .to_string(),
            ),
            (
                "tweet.fields",
                "created_at,author_id,conversation_id,referenced_tweets".to_string(),
            ),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(since) = since_id {
            query.push(("since_id", since.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/2/users/{}/mentions", self.base_url, account_id))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let page: MentionPage = response.json().await.map_err(transport)?;
        let mentions = page.into_mentions();
        tracing::debug!("Fetched {} mention(s)", mentions.len());
        Ok(mentions)
    }

    async fn post_text(&self, post_id: &str) -> Result<Option<String>, PublishError> {
        let response = self
            .client
            .get(format!("{}/2/tweets/{}", self.base_url, post_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let lookup: MaybeData<CreatedPost> = response.json().await.map_err(transport)?;
        Ok(lookup.data.map(|post| post.text))
    }

    async fn verify(&self) -> Result<String, PublishError> {
        let response = self
            .client
            .get(format!("{}/2/users/me", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let me: DataEnvelope<User> = response.json().await.map_err(transport)?;
        tracing::debug!("Publisher authenticated as @{} ({})", me.data.username, me.data.id);
        Ok(me.data.id)
    }

    fn name(&self) -> &str {
        "x"
    }
}
