//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`] and passed by reference to
//! every component. Secrets are never stored in the file: the source API
//! key and the embedding API key are read from environment variables named
//! here.
//!
//! ```toml
//! [db]
//! path = "./data/csync.sqlite"
//!
//! [source]
//! name = "forum"
//! base_url = "https://forum.example.com"
//! auth = "api_key"            # none | api_key | bearer
//! api_key_env = "FORUM_API_KEY"
//! api_username = "system"
//! cooldown_ms = 500
//!
//! [retry]                   # source requests
//! max_attempts = 4
//! base_delay_ms = 500
//!
//! [chunking]
//! max_tokens = 700
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! max_retries = 5             # embedding requests retry on their own budget
//! retry_base_delay_ms = 1000
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Source label stored with every fingerprint and record.
    #[serde(default = "default_source_name")]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthScheme,
    /// Environment variable holding the API key or bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Sent as `Api-Username` with [`AuthScheme::ApiKey`].
    #[serde(default)]
    pub api_username: Option<String>,
    /// Fixed delay between consecutive requests to the source.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Stop listing after this many pages (unbounded when unset).
    #[serde(default)]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    None,
    ApiKey,
    Bearer,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries after the first embedding request; independent of `[retry]`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_embedding_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_embedding_retry_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_source_name() -> String {
    "forum".to_string()
}
fn default_cooldown_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_retry_base_delay_ms() -> u64 {
    1_000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl SourceConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Resolve the credential from the environment, if auth is configured.
    pub fn api_key(&self) -> Result<Option<String>> {
        if self.auth == AuthScheme::None {
            return Ok(None);
        }
        let var = self
            .api_key_env
            .as_deref()
            .context("source.api_key_env must be set when source.auth is not 'none'")?;
        let key = std::env::var(var)
            .with_context(|| format!("{} environment variable not set", var))?;
        Ok(Some(key))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.source.name.trim().is_empty() {
        bail!("source.name must not be empty");
    }

    if !(config.source.base_url.starts_with("http://")
        || config.source.base_url.starts_with("https://"))
    {
        bail!(
            "source.base_url must be an http(s) URL, got '{}'",
            config.source.base_url
        );
    }

    if config.source.auth != AuthScheme::None && config.source.api_key_env.is_none() {
        bail!("source.api_key_env must be set when source.auth is not 'none'");
    }

    if config.source.max_pages == Some(0) {
        bail!("source.max_pages must be >= 1 when set");
    }

    if config.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/csync.sqlite"

[source]
base_url = "https://forum.example.com"

[chunking]
max_tokens = 700
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.source.name, "forum");
        assert_eq!(cfg.source.auth, AuthScheme::None);
        assert_eq!(cfg.source.cooldown_ms, 500);
        assert_eq!(cfg.retry.max_attempts, 4);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_rejects_zero_max_tokens() {
        let text = MINIMAL.replace("max_tokens = 700", "max_tokens = 0");
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let text = MINIMAL.replace("https://forum.example.com", "ftp://forum.example.com");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_auth_requires_key_env() {
        let text = MINIMAL.replace(
            "base_url = \"https://forum.example.com\"",
            "base_url = \"https://forum.example.com\"\nauth = \"bearer\"",
        );
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("api_key_env"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let text = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());

        let text = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
            MINIMAL
        );
        let cfg = parse_config(&text).unwrap();
        assert!(cfg.embedding.is_enabled());
        assert_eq!(cfg.embedding.dims, Some(1536));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let text = format!(
            "{}\n[embedding]\nprovider = \"magic\"\nmodel = \"m\"\ndims = 3\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
