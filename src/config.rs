//! TOML configuration parsing and validation.
//!
//! Configuration is read once at startup by [`load_config`] into an
//! immutable [`Config`] that is handed to each component's constructor.
//! Credentials may be written into the file or left out and supplied via
//! the environment; environment values only fill fields the file leaves
//! unset.
//!
//! | Field | Environment fallback |
//! |-------|----------------------|
//! | `slack.bot_token` | `SLACK_BOT_TOKEN` |
//! | `slack.app_token` | `SLACK_APP_TOKEN` |
//! | `llm.api_key` / `embedding.api_key` (gemini) | `GOOGLE_API_KEY` |
//! | `llm.api_key` / `embedding.api_key` (openai) | `OPENAI_API_KEY` |
//!
//! See `config/nestie.example.toml` for a complete file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nestie_core::error::Error;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
    #[serde(default = "default_slack_timeout")]
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            bot_name: default_bot_name(),
            api_url: default_slack_api_url(),
            timeout_secs: default_slack_timeout(),
        }
    }
}

fn default_bot_name() -> String {
    "Nestie".to_string()
}
fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}
fn default_slack_timeout() -> u64 {
    30
}

/// Slack credentials, present only once validated by [`Config::slack_credentials`].
#[derive(Debug, Clone)]
pub struct SlackCredentials {
    pub bot_token: String,
    pub app_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            api_key: None,
            url: None,
            timeout_secs: default_llm_timeout(),
            retry: RetryConfig::default(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_fallback_message() -> String {
    "😅 Sorry, I encountered an error. Please try again or contact support.".to_string()
}

/// Bounded retry with exponential backoff, shared by every external call.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    32_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: Some("models/embedding-001".to_string()),
            dims: Some(768),
            api_key: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Logical document name → file path.
    #[serde(default)]
    pub named: BTreeMap<String, PathBuf>,
    /// Optional directory scanned in addition to `named`; the file stem
    /// becomes the document name.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            named: BTreeMap::new(),
            directory: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Turns kept per (channel, user).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Conversations kept in memory; the least recently active is evicted.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    /// Most recent turns rendered into each prompt.
    #[serde(default = "default_history_in_prompt")]
    pub history_in_prompt: usize,
    #[serde(default = "default_max_channel_messages")]
    pub max_channel_messages: usize,
    /// Character budget for the message transcript sent to the model.
    #[serde(default = "default_analysis_char_budget")]
    pub analysis_char_budget: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            max_conversations: default_max_conversations(),
            history_in_prompt: default_history_in_prompt(),
            max_channel_messages: default_max_channel_messages(),
            analysis_char_budget: default_analysis_char_budget(),
        }
    }
}

fn default_max_conversations() -> usize {
    1000
}
fn default_max_history() -> usize {
    10
}
fn default_history_in_prompt() -> usize {
    2
}
fn default_max_channel_messages() -> usize {
    200
}
fn default_analysis_char_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"sqlite"` (persisted) or `"memory"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            path: default_index_path(),
        }
    }
}

fn default_index_backend() -> String {
    "sqlite".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/nestie.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Slack tokens, or a configuration error naming what is missing.
    pub fn slack_credentials(&self) -> Result<SlackCredentials, Error> {
        let bot_token = non_empty(&self.slack.bot_token).ok_or_else(|| {
            Error::Configuration("slack.bot_token (or SLACK_BOT_TOKEN) is required".to_string())
        })?;
        let app_token = non_empty(&self.slack.app_token).ok_or_else(|| {
            Error::Configuration("slack.app_token (or SLACK_APP_TOKEN) is required".to_string())
        })?;
        if !bot_token.starts_with("xoxb-") {
            return Err(Error::Configuration(
                "slack.bot_token must be a bot token (xoxb-...)".to_string(),
            ));
        }
        if !app_token.starts_with("xapp-") {
            return Err(Error::Configuration(
                "slack.app_token must be an app-level token (xapp-...)".to_string(),
            ));
        }
        Ok(SlackCredentials {
            bot_token: bot_token.to_string(),
            app_token: app_token.to_string(),
        })
    }

    /// Fill unset credentials from the process environment.
    fn apply_env(&mut self) {
        fill_from_env(&mut self.slack.bot_token, "SLACK_BOT_TOKEN");
        fill_from_env(&mut self.slack.app_token, "SLACK_APP_TOKEN");
        if let Some(var) = api_key_var(&self.llm.provider) {
            fill_from_env(&mut self.llm.api_key, var);
        }
        if let Some(var) = api_key_var(&self.embedding.provider) {
            fill_from_env(&mut self.embedding.api_key, var);
        }
    }
}

fn api_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("GOOGLE_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if non_empty(slot).is_none() {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                *slot = Some(value);
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Read, parse, overlay environment credentials, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.apply_env();
    Ok(config)
}

/// Parse and validate configuration text without consulting the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Conversation
    if config.conversation.max_conversations == 0 {
        bail!("conversation.max_conversations must be >= 1");
    }
    if config.conversation.max_channel_messages == 0 {
        bail!("conversation.max_channel_messages must be >= 1");
    }

    // Retry budgets
    for (section, retry) in [("llm", &config.llm.retry), ("embedding", &config.embedding.retry)] {
        if retry.max_attempts == 0 {
            bail!("{}.retry.max_attempts must be >= 1", section);
        }
    }

    // LLM
    match config.llm.provider.as_str() {
        "gemini" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be gemini or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "gemini" | "openai" | "ollama" | "hashed" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, ollama, hashed, or local.",
            other
        ),
    }
    if config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && config.embedding.provider != "hashed" {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.provider == "gemini"
        && config.embedding.batch_size > crate::embedding::GEMINI_MAX_BATCH_SIZE
    {
        bail!(
            "embedding.batch_size ({}) exceeds the gemini limit of {}",
            config.embedding.batch_size,
            crate::embedding::GEMINI_MAX_BATCH_SIZE
        );
    }

    // Index
    match config.index.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown index backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_original_bot() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.conversation.max_history, 10);
        assert_eq!(config.conversation.max_conversations, 1000);
        assert_eq!(config.conversation.max_channel_messages, 200);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.embedding.model.as_deref(), Some("models/embedding-001"));
    }

    #[test]
    fn test_named_documents() {
        let config = parse_config(
            r#"
[documents.named]
"Company Culture" = "documents/CompanyCulture.pdf"
"Company Policies" = "documents/CompanyPolicies.pdf"
"#,
        )
        .unwrap();
        assert_eq!(config.documents.named.len(), 2);
        assert_eq!(
            config.documents.named["Company Policies"],
            PathBuf::from("documents/CompanyPolicies.pdf")
        );
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[llm]\nprovider = \"palm\"\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"word2vec\"\ndims = 3\n").is_err());
        assert!(parse_config("[index]\nbackend = \"chroma\"\n").is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(parse_config("[llm.retry]\nmax_attempts = 0\n").is_err());
    }

    #[test]
    fn test_gemini_batch_size_capped() {
        let base = "[embedding]\nprovider = \"gemini\"\nmodel = \"text-embedding-004\"\ndims = 768\n";
        assert!(parse_config(&format!("{}batch_size = 100\n", base)).is_ok());
        let err = parse_config(&format!("{}batch_size = 101\n", base)).unwrap_err();
        assert!(err.to_string().contains("batch_size"), "{}", err);
        assert!(parse_config(
            "[embedding]\nprovider = \"hashed\"\ndims = 8\nbatch_size = 500\n"
        )
        .is_ok());
    }

    #[test]
    fn test_hashed_embedder_needs_only_dims() {
        let config = parse_config("[embedding]\nprovider = \"hashed\"\ndims = 64\n").unwrap();
        assert_eq!(config.embedding.dims, Some(64));
        assert!(parse_config("[embedding]\nprovider = \"hashed\"\n").is_err());
    }

    #[test]
    fn test_slack_credentials_required_and_shaped() {
        let config = parse_config("").unwrap();
        assert!(matches!(
            config.slack_credentials(),
            Err(Error::Configuration(_))
        ));

        let config = parse_config(
            "[slack]\nbot_token = \"xapp-wrong\"\napp_token = \"xapp-1\"\n",
        )
        .unwrap();
        assert!(config.slack_credentials().is_err());

        let config = parse_config(
            "[slack]\nbot_token = \"xoxb-1\"\napp_token = \"xapp-1\"\n",
        )
        .unwrap();
        let creds = config.slack_credentials().unwrap();
        assert_eq!(creds.bot_token, "xoxb-1");
        assert_eq!(creds.app_token, "xapp-1");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
