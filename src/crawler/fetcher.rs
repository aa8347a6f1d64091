//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the scraper, including:
//! - Building the HTTP client with timeouts and compression
//! - Building per-page listing URLs
//! - Rotating the User-Agent header on every request
//! - Retrying transient failures with capped exponential backoff
//! - Writing each fetched page through to the checkpoint store

use crate::config::{Config, ScraperConfig};
use crate::state::{Exhausted, PageTask};
use crate::storage::{CheckpointStore, StorageError};
use crate::url::page_url;
use crate::HarvestError;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A fault worth retrying
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for TransientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Why a page could not be delivered
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed; the page degrades to zero records
    #[error(transparent)]
    Exhausted(#[from] Exhausted),

    /// The page was fetched but could not be checkpointed; fatal to the run
    #[error(transparent)]
    Checkpoint(#[from] StorageError),
}

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-based): `min(base * 2^attempt, cap)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl From<&ScraperConfig> for RetryPolicy {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// No default User-Agent is set; every request picks one from the pool.
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout().min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches listing pages and checkpoints them
pub struct PageFetcher {
    client: Client,
    listing_url: Url,
    page_param: String,
    user_agents: Vec<String>,
    policy: RetryPolicy,
    store: Arc<dyn CheckpointStore>,
}

impl PageFetcher {
    /// Creates a fetcher for the configured listing
    ///
    /// # Returns
    ///
    /// * `Ok(PageFetcher)` - Ready to fetch
    /// * `Err(HarvestError)` - The listing URL is invalid or the client failed to build
    pub fn new(config: &Config, store: Arc<dyn CheckpointStore>) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.scraper)?;
        let listing_url = Url::parse(&config.source.listing_url)?;

        Ok(Self {
            client,
            listing_url,
            page_param: config.source.page_param.clone(),
            user_agents: config.source.user_agents.clone(),
            policy: RetryPolicy::from(&config.scraper),
            store,
        })
    }

    /// URL of a listing page
    pub fn page_url(&self, page: u32) -> Url {
        page_url(&self.listing_url, &self.page_param, page)
    }

    /// Picks a User-Agent uniformly from the pool
    fn pick_user_agent(&self) -> &str {
        match self.user_agents.len() {
            0 => "",
            len => &self.user_agents[rand::random_range(0..len)],
        }
    }

    /// Performs one request for one page
    ///
    /// Any status >= 400, timeout, or transport failure is a [`TransientError`].
    pub async fn fetch(&self, page: u32, attempt: u32) -> Result<String, TransientError> {
        let url = self.page_url(page);
        let user_agent = self.pick_user_agent();

        tracing::trace!("GET {} (attempt {}, UA {})", url, attempt + 1, user_agent);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(TransientError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Fetches a page with retries, then writes it to the checkpoint store
    ///
    /// # Retry Logic
    ///
    /// | Attempt | On transient failure |
    /// |---------|----------------------|
    /// | 0..max_retries | sleep `min(base * 2^attempt, cap)`, retry |
    /// | max_retries | give up with [`Exhausted`] |
    ///
    /// The checkpoint is written before returning, whatever the page turns
    /// out to contain.
    pub async fn fetch_page(&self, task: &mut PageTask) -> Result<String, FetchError> {
        loop {
            let attempt = task.retries;

            match self.fetch(task.page, attempt).await {
                Ok(body) => {
                    self.store.put(task.page, &body)?;
                    if attempt > 0 {
                        tracing::debug!("Page {} succeeded after {} retries", task.page, attempt);
                    }
                    return Ok(body);
                }
                Err(error) if attempt >= self.policy.max_retries => {
                    return Err(Exhausted {
                        page: task.page,
                        attempts: attempt + 1,
                        last_error: error.to_string(),
                    }
                    .into());
                }
                Err(error) => {
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(
                        "Page {} attempt {} failed ({}), retrying in {:?}",
                        task.page,
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    task.record_retry();
                }
            }
        }
    }
}
