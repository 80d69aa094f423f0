use crate::config::types::{Config, CrawlerConfig, HttpConfig, LimitsConfig, OutputConfig};
use crate::crawler::{DetailSelectors, ListingSelectors};
use crate::url::page_url;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    validate_limits_config(&config.limits)?;
    validate_output_config(&config.output)?;

    ListingSelectors::from_config(&config.selectors)
        .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
    DetailSelectors::from_config(&config.selectors)
        .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;

    Ok(())
}

/// Validates which pages are fetched and by how many workers
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    page_url(&config.url_template, config.start_page.max(1))
        .map_err(|e| ConfigError::InvalidUrl(format!("url-template: {}", e)))?;

    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start-page must be >= 1, got {}",
            config.start_page
        )));
    }

    if config.page_count == Some(0) {
        return Err(ConfigError::Validation(
            "page-count must be >= 1 (omit it to discover the page count)".to_string(),
        ));
    }

    if let Some(count) = config.page_count {
        if config.start_page.checked_add(count - 1).is_none() {
            return Err(ConfigError::Validation(format!(
                "start-page {} + page-count {} overflows the page number range",
                config.start_page, count
            )));
        }
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.adaptive_lookahead < 1 {
        return Err(ConfigError::Validation(format!(
            "adaptive-lookahead must be >= 1, got {}",
            config.adaptive_lookahead
        )));
    }

    Ok(())
}

/// Validates timeouts, retries and pacing
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the fatal-error thresholds
fn validate_limits_config(config: &LimitsConfig) -> Result<(), ConfigError> {
    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max-consecutive-failures must be >= 1, got {}",
            config.max_consecutive_failures
        )));
    }

    if !(config.max_failure_ratio > 0.0 && config.max_failure_ratio <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "max-failure-ratio must be in (0, 1], got {}",
            config.max_failure_ratio
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
