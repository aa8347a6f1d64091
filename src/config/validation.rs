use crate::config::types::{Config, OutputConfig, ScraperConfig, SourceConfig};
use crate::ConfigError;
use url::Url;

const MAX_BATCH_SIZE: u32 = 1000;
const MAX_CONCURRENCY: usize = 256;
const MAX_RETRIES: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_scraper_config(&config.scraper)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote listing configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    validate_http_url("listing-url", &config.listing_url)?;
    validate_http_url("site-origin", &config.site_origin)?;

    if config.page_param.trim().is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    if config.total_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "total-pages must be >= 1, got {}",
            config.total_pages
        )));
    }

    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates scheduler and fetcher tuning
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch_size
        )));
    }

    if config.min_concurrency < 1 {
        return Err(ConfigError::Validation(
            "min-concurrency must be >= 1".to_string(),
        ));
    }

    if let Some(concurrency) = config.concurrency {
        if concurrency < config.min_concurrency || concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "concurrency must be between min-concurrency ({}) and {}, got {}",
                config.min_concurrency, MAX_CONCURRENCY, concurrency
            )));
        }
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.backoff_cap_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-cap-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_cap_ms, config.backoff_base_ms
        )));
    }

    if config.pause_high_ms < config.pause_low_ms {
        return Err(ConfigError::Validation(format!(
            "pause-high-ms ({}) must be >= pause-low-ms ({})",
            config.pause_high_ms, config.pause_low_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_dir.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint-dir cannot be empty".to_string(),
        ));
    }

    if config.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Requires an absolute http(s) URL
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
