// Brave web search client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{SearchResult, TrendSource};

const SEARCH_TIMEOUT_SECS: u64 = 10;

/// Brave Search API (`X-Subscription-Token` auth)
#[derive(Clone)]
pub struct BraveSearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl BraveSearch {
    pub fn new(api_key: String, endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl TrendSource for BraveSearch {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchResult>> {
        let count_param = count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", count_param.as_str()),
                ("search_lang", "en"),
                ("country", "US"),
            ])
            .send()
            .await
            .context("Failed to send request to Brave Search")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Brave Search unavailable (status: {})", status);
        }

        let body: BraveResponse = response
            .json()
            .await
            .context("Failed to parse Brave Search response")?;

        Ok(body
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(count as usize)
            .map(|r| SearchResult {
                title: r.title,
                description: r.description,
                url: r.url,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "brave"
    }
}
