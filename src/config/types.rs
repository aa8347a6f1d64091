use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Property-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The remote paginated listing
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Listing endpoint; page 1 is fetched from this URL as-is
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Origin that relative detail-view links are resolved against
    #[serde(rename = "site-origin")]
    pub site_origin: String,

    /// Query parameter carrying the page number for pages after the first
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Total number of pages in the dataset
    #[serde(rename = "total-pages")]
    pub total_pages: u32,

    /// Pool of User-Agent strings rotated on every request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

/// Batch scheduler and fetcher tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Pages per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Initial concurrency; derived from available parallelism when unset
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Floor that adaptive concurrency never drops below
    #[serde(rename = "min-concurrency", default = "default_min_concurrency")]
    pub min_concurrency: usize,

    /// Failures tolerated within an adaptation window before reducing concurrency
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Fixed delay each task waits before fetching (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries per page after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base delay (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Inter-batch pause when the last batch mostly succeeded (milliseconds)
    #[serde(rename = "pause-low-ms", default = "default_pause_low_ms")]
    pub pause_low_ms: u64,

    /// Inter-batch pause when the last batch saw many failures (milliseconds)
    #[serde(rename = "pause-high-ms", default = "default_pause_high_ms")]
    pub pause_high_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding one raw file per fetched page
    #[serde(rename = "checkpoint-dir", default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Directory the JSON artifacts are written to
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: String,
}

impl ScraperConfig {
    /// Initial concurrency for a run
    pub fn initial_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            let units = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (units * 2).max(self.min_concurrency)
        })
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: None,
            min_concurrency: default_min_concurrency(),
            failure_threshold: default_failure_threshold(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            pause_low_ms: default_pause_low_ms(),
            pause_high_ms: default_pause_high_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_page_param() -> String {
    "page".to_string()
}

pub(crate) fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_batch_size() -> u32 {
    50
}

fn default_min_concurrency() -> usize {
    3
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

fn default_pause_low_ms() -> u64 {
    500
}

fn default_pause_high_ms() -> u64 {
    3000
}

fn default_checkpoint_dir() -> String {
    "pages".to_string()
}

fn default_output_dir() -> String {
    ".".to_string()
}
