// Project-wide constants
//
// Centralised here so limits, model ids and endpoints have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Maximum post length accepted by the publishing platform, in chars.
pub const PLATFORM_CHAR_LIMIT: usize = 280;

/// Marker appended to a truncated artifact.
pub const ELLIPSIS: &str = "...";

/// Default number of generate/review passes per run.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Model used by the four generation stages.
pub const DEFAULT_STAGE_MODEL: &str = "anthropic/claude-3-haiku";

/// Model used by the reviewer (stricter, more authoritative framing).
pub const DEFAULT_REVIEW_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Default maximum tokens per completion request.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Default sampling temperature for completion requests.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Transport timeout for every outbound HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// OpenRouter exposes the OpenAI-compatible API under `/api/v1`.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// X (Twitter) API v2 base URL.
pub const X_API_BASE_URL: &str = "https://api.twitter.com";

pub const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Search hits requested per trend query.
pub const DEFAULT_SEARCH_RESULTS: u32 = 3;

/// Mentions requested per poll.
pub const DEFAULT_MENTIONS_PER_POLL: u32 = 10;

/// Replies sent per poll, oldest pending mention first.
pub const DEFAULT_REPLIES_PER_POLL: usize = 5;

/// Minutes between polls in `quill mentions --watch`.
pub const DEFAULT_MONITOR_INTERVAL_MINUTES: u64 = 5;

/// Name of the per-user data directory under `$HOME`.
pub const DATA_DIR_NAME: &str = ".quill";
