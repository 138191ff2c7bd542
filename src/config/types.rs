use crate::state::PayloadKind;
use serde::Deserialize;

/// Main configuration structure for Coleta
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

impl Config {
    /// Looks up a configured task by name
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Fetch layer behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Number of workers and of concurrent outbound requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall clock timeout of a single request (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per URL within one run before it becomes a terminal failure
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between two attempts of the same URL (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Whether JSON payloads have their `links` followed
    #[serde(default = "default_true")]
    pub follow_pagination: bool,

    /// Query parameter carrying the page number
    #[serde(default = "default_page_parameter")]
    pub page_parameter: String,

    /// Delete pending failure records of URLs fetched successfully
    #[serde(default = "default_true")]
    pub resolve_on_success: bool,

    /// Log progress every N completed URLs
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            follow_pagination: true,
            page_parameter: default_page_parameter(),
            resolve_on_success: true,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_page_parameter() -> String {
    "pagina".to_string()
}

fn default_progress_interval() -> usize {
    25
}

fn default_true() -> bool {
    true
}

/// User agent identification sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    pub name: String,
    pub version: String,
    /// URL or e-mail a data provider can use to reach the operators
    pub contact: String,
}

impl UserAgentConfig {
    /// Formats the header value: `name/version (+contact)`
    pub fn header_value(&self) -> String {
        format!("{}/{} (+{})", self.name, self.version, self.contact)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding batches and pending failures
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving NDJSON exports and per-task payload files
    #[serde(rename = "extract-dir")]
    pub extract_dir: String,
}

/// Where a task's successful payloads end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Files,
}

/// One named extraction task
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub kind: PayloadKind,

    #[serde(default)]
    pub store: StoreKind,

    /// Overrides `fetcher.follow-pagination` when present
    #[serde(default)]
    pub follow_pagination: Option<bool>,

    #[serde(default)]
    pub urls: Vec<String>,
}
