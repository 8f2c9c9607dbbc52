// Configuration loader
// Layers ~/.quill/config.toml, QUILL_* environment overrides and
// well-known provider variables (OPENROUTER_API_KEY, X_ACCESS_TOKEN, ...)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::constants::DATA_DIR_NAME;
use super::settings::{Config, ProviderKind};

/// Default config file location (~/.quill/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(DATA_DIR_NAME).join("config.toml"))
}

/// Load configuration from the default location
pub fn load_config() -> Result<Config> {
    load_config_from(&default_config_path()?)
}

/// Load configuration from `path` (which may not exist), apply environment
/// overrides and validate the result.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let file = ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Toml)
        .required(false);

    // QUILL_PIPELINE__MAX_ATTEMPTS=5 -> pipeline.max_attempts = 5
    let env = ::config::Environment::with_prefix("QUILL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true);

    let settings = ::config::Config::builder()
        .add_source(file)
        .add_source(env)
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let mut config: Config = settings
        .try_deserialize()
        .context("Failed to parse configuration")?;

    apply_env_fallbacks(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::debug!(
        "Loaded configuration (provider: {:?}, max_attempts: {})",
        config.provider.kind,
        config.pipeline.max_attempts
    );

    Ok(config)
}

/// Fill unset secrets from the conventional provider variables.
///
/// Values already present in the file or QUILL_* overrides win.
pub fn apply_env_fallbacks<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if config.provider.api_key.trim().is_empty() {
        let key = match config.provider.kind {
            ProviderKind::Openrouter => non_empty("OPENROUTER_API_KEY"),
            ProviderKind::Openai => non_empty("OPENAI_API_KEY"),
        };
        if let Some(key) = key {
            config.provider.api_key = key;
        }
    }

    if config.publisher.access_token.is_none() {
        config.publisher.access_token =
            non_empty("X_ACCESS_TOKEN").or_else(|| non_empty("TWITTER_ACCESS_TOKEN"));
    }

    if config.search.api_key.is_none() {
        config.search.api_key = non_empty("BRAVE_API_KEY");
    }
}
