use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8800
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("helpdesk.db")
}

/// Ticketing API credentials and endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Zone URL assigned to the account (e.g., "https://webservices15.autotask.net")
    #[serde(default = "default_zone_url")]
    pub zone_url: String,
    /// API user name
    pub username: String,
    /// API user secret
    pub secret: String,
    /// Tracking identifier of the API integration
    pub integration_code: String,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u32,
}

fn default_zone_url() -> String {
    "https://webservices15.autotask.net".to_string()
}

fn default_upstream_timeout() -> u32 {
    60
}

/// Sync tuning: batch sizes, concurrency and pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Default tickets per page.
    #[serde(default = "default_max_tickets_per_request")]
    pub max_tickets_per_request: u32,
    /// Default number of concurrent per-ticket detail fetches.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Upper bound accepted for a requested page size.
    #[serde(default = "default_max_fetch_limit")]
    pub max_fetch_limit: u32,
    /// Upper bound accepted for a requested concurrency limit.
    #[serde(default = "default_max_concurrency_limit")]
    pub max_concurrency_limit: usize,
    /// MaxRecords used for notes and time entries of a single ticket.
    #[serde(default = "default_detail_page_size")]
    pub detail_page_size: u32,
    /// Attempts per child request when rate limited.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Delay before a ticket's first child request.
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    /// Delay between the notes and time entries requests.
    #[serde(default = "default_sub_request_delay_ms")]
    pub sub_request_delay_ms: u64,
    /// Pause between ticket pages.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_tickets_per_request: default_max_tickets_per_request(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_fetch_limit: default_max_fetch_limit(),
            max_concurrency_limit: default_max_concurrency_limit(),
            detail_page_size: default_detail_page_size(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            politeness_delay_ms: default_politeness_delay_ms(),
            sub_request_delay_ms: default_sub_request_delay_ms(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

fn default_max_tickets_per_request() -> u32 {
    500
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_max_fetch_limit() -> u32 {
    1000
}

fn default_max_concurrency_limit() -> usize {
    10
}

fn default_detail_page_size() -> u32 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1500
}

fn default_politeness_delay_ms() -> u64 {
    300
}

fn default_sub_request_delay_ms() -> u64 {
    200
}

fn default_batch_pause_ms() -> u64 {
    2000
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// OpenAI chat completions API (or any compatible endpoint).
    #[serde(alias = "open_ai")]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }
}

/// LLM client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Model used to translate questions into queries and analyse tickets.
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper model used for short result summaries.
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u32 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upstream: SanitizedUpstreamConfig,
    pub sync: SyncConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<SanitizedLlmConfig>,
}

/// Upstream config with credentials hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUpstreamConfig {
    pub zone_url: String,
    pub username: String,
    pub secret_configured: bool,
    pub integration_code_configured: bool,
    pub timeout_secs: u32,
}

/// LLM config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLlmConfig {
    pub provider: String,
    pub model: String,
    pub summary_model: String,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            upstream: SanitizedUpstreamConfig {
                zone_url: config.upstream.zone_url.clone(),
                username: config.upstream.username.clone(),
                secret_configured: !config.upstream.secret.is_empty(),
                integration_code_configured: !config.upstream.integration_code.is_empty(),
                timeout_secs: config.upstream.timeout_secs,
            },
            sync: config.sync.clone(),
            llm: config.llm.as_ref().map(|l| SanitizedLlmConfig {
                provider: l.provider.as_str().to_string(),
                model: l.model.clone(),
                summary_model: l.summary_model.clone(),
                api_key_configured: l.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                api_base: l.api_base.clone(),
            }),
        }
    }
}
