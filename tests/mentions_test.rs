// `quill mentions` wiring against mocked provider and X endpoints

use anyhow::Result;
use mockito::Matcher;
use tempfile::TempDir;

use quill::app::{self, MentionOptions};
use quill::config::{Config, ProviderConfig, PublisherConfig};
use quill::store::SqliteEngagementStore;

fn completion(text: &str) -> String {
    serde_json::json!({
        "id": "gen-1",
        "model": "mock",
        "choices": [
            {"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}
        ]
    })
    .to_string()
}

fn config_for(server: &mockito::ServerGuard, dir: &TempDir) -> Config {
    Config {
        provider: ProviderConfig {
            api_key: "sk-test".to_string(),
            base_url: Some(server.url()),
            ..Default::default()
        },
        publisher: PublisherConfig {
            access_token: Some("user-token".to_string()),
            base_url: server.url(),
            ..Default::default()
        },
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

async fn mock_account(server: &mut mockito::ServerGuard) {
    server
        .mock("GET", "/2/users/me")
        .with_status(200)
        .with_body(r#"{"data":{"id":"42","name":"Quill","username":"quill"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/2/tweets/90")
        .with_status(200)
        .with_body(r#"{"data":{"id":"90","text":"Automate one report a week"}}"#)
        .create_async()
        .await;
}

const MENTIONS_PAGE: &str = r#"{
    "data": [
        {"id": "1830000000000000102", "text": "@quill which scheduler do you use?", "author_id": "7",
         "referenced_tweets": [{"type": "replied_to", "id": "90"}]}
    ],
    "includes": {"users": [{"id": "7", "name": "Ada", "username": "ada"}]},
    "meta": {"result_count": 1}
}"#;

#[tokio::test]
async fn test_poll_replies_to_new_mention() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    mock_account(&mut server).await;
    let mentions = server
        .mock("GET", "/2/users/42/mentions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(MENTIONS_PAGE)
        .create_async()
        .await;
    let provider = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("Automate one report a week".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("Plain cron plus a webhook, nothing fancy."))
        .expect(1)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/2/tweets")
        .match_body(Matcher::Json(serde_json::json!({
            "text": "Plain cron plus a webhook, nothing fancy.",
            "reply": {"in_reply_to_tweet_id": "1830000000000000102"}
        })))
        .with_status(201)
        .with_body(r#"{"data":{"id":"1830000000000000200","text":"Plain cron plus a webhook, nothing fancy."}}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(&server, &dir);

    let report = app::poll_mentions(&config, MentionOptions::default()).await?;
    assert_eq!(report.new, 1);
    assert_eq!(report.replied, 1);

    mentions.assert_async().await;
    provider.assert_async().await;
    reply.assert_async().await;

    let store = SqliteEngagementStore::open(&config.analytics_db_path())?;
    assert_eq!(store.stats().await?.pending, 0);
    assert_eq!(
        store.last_seen_id().await?.as_deref(),
        Some("1830000000000000102")
    );
    Ok(())
}

#[tokio::test]
async fn test_dry_run_poll_sends_nothing() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    mock_account(&mut server).await;
    server
        .mock("GET", "/2/users/42/mentions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(MENTIONS_PAGE)
        .create_async()
        .await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("Plain cron."))
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/2/tweets")
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(&server, &dir);

    let options = MentionOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = app::poll_mentions(&config, options).await?;
    assert_eq!(report.drafted, 1);
    assert_eq!(report.replied, 0);
    reply.assert_async().await;

    let store = SqliteEngagementStore::open(&config.analytics_db_path())?;
    assert_eq!(store.stats().await?.pending, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_mentions_fetch_is_an_error() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    mock_account(&mut server).await;
    server
        .mock("GET", "/2/users/42/mentions")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("Unauthorized")
        .create_async()
        .await;

    let dir = TempDir::new()?;
    let config = config_for(&server, &dir);

    let err = app::poll_mentions(&config, MentionOptions::default())
        .await
        .err()
        .unwrap();
    assert!(format!("{:#}", err).contains("Failed to fetch mentions"));
    Ok(())
}
