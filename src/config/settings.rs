// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::constants::*;

/// Which OpenAI-compatible endpoint the text-generation client talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openrouter,
    Openai,
}

/// Text-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// API key for the provider (falls back to OPENROUTER_API_KEY / OPENAI_API_KEY)
    pub api_key: String,

    /// Optional base URL override (self-hosted gateways, tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used by research/compose/keyword/finalize stages
    pub stage_model: String,

    /// Model used by the reviewer
    pub review_model: String,

    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openrouter,
            api_key: String::new(),
            base_url: None,
            stage_model: DEFAULT_STAGE_MODEL.to_string(),
            review_model: DEFAULT_REVIEW_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Feedback loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on generate/review passes per run
    pub max_attempts: u32,

    /// Platform length limit applied to approved artifacts
    pub char_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            char_limit: PLATFORM_CHAR_LIMIT,
        }
    }
}

/// Social publish service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// OAuth 2.0 user access token (falls back to X_ACCESS_TOKEN)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: X_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Trend search settings (optional: research runs without it)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub results_per_query: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: BRAVE_SEARCH_URL.to_string(),
            results_per_query: DEFAULT_SEARCH_RESULTS,
        }
    }
}

/// Mention monitoring and auto-reply settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Mentions fetched per poll (X accepts 5..=100)
    pub max_results: u32,

    /// Replies sent per poll; the rest wait for the next one
    pub max_replies: usize,

    pub interval_minutes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MENTIONS_PER_POLL,
            max_replies: DEFAULT_REPLIES_PER_POLL,
            interval_minutes: DEFAULT_MONITOR_INTERVAL_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub publisher: PublisherConfig,
    pub search: SearchConfig,
    pub monitor: MonitorConfig,

    /// Persona TOML file; the built-in default persona is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_path: Option<PathBuf>,

    /// Calendar TOML file; the built-in 30-day calendar is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_path: Option<PathBuf>,

    /// Root for failure records, analytics, run journals and progress
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME);

        Self {
            provider: ProviderConfig::default(),
            pipeline: PipelineConfig::default(),
            publisher: PublisherConfig::default(),
            search: SearchConfig::default(),
            monitor: MonitorConfig::default(),
            persona_path: None,
            calendar_path: None,
            data_dir,
        }
    }
}

impl Config {
    /// Directory holding failure records awaiting manual review
    pub fn failed_dir(&self) -> PathBuf {
        self.data_dir.join("failed")
    }

    pub fn analytics_db_path(&self) -> PathBuf {
        self.data_dir.join("analytics.db")
    }

    /// Content calendar progress file
    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join("strategy_progress.json")
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_attempts < 1 {
            bail!(
                "pipeline.max_attempts must be at least 1 (got {})",
                self.pipeline.max_attempts
            );
        }

        // Room for at least one char plus the ellipsis
        if self.pipeline.char_limit <= ELLIPSIS.len() {
            bail!(
                "pipeline.char_limit must be greater than {} (got {})",
                ELLIPSIS.len(),
                self.pipeline.char_limit
            );
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            bail!(
                "provider.temperature must be between 0.0 and 2.0 (got {})",
                self.provider.temperature
            );
        }

        if self.provider.stage_model.trim().is_empty() || self.provider.review_model.trim().is_empty() {
            bail!("provider.stage_model and provider.review_model must not be empty");
        }

        if !(5..=100).contains(&self.monitor.max_results) {
            bail!(
                "monitor.max_results must be between 5 and 100 (got {})",
                self.monitor.max_results
            );
        }

        if self.monitor.interval_minutes < 1 {
            bail!("monitor.interval_minutes must be at least 1");
        }

        Ok(())
    }

    /// Generation needs a provider key; read-only commands do not
    pub fn require_api_key(&self) -> Result<()> {
        if self.provider.api_key.trim().is_empty() {
            bail!(
                "No API key configured for the text-generation provider.\n\n\
                 Set provider.api_key in ~/{}/config.toml or export OPENROUTER_API_KEY.",
                DATA_DIR_NAME
            );
        }
        Ok(())
    }
}
