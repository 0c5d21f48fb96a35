//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::enrichment::DEFAULT_CONCURRENCY;
use crate::error::ConfigError;

/// Default backend origin.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Viewer configuration.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Base URL hosting `/api/search`, `/classify` and `/generate-reply`.
    pub api_url: String,
    /// Maximum number of emails being enriched at once.
    pub enrich_concurrency: usize,
    /// Per-request timeout. `None` means no timeout.
    pub request_timeout: Option<Duration>,
    /// Rows per table page.
    pub page_size: usize,
    /// Directory for rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            enrich_concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Some(Duration::from_secs(30)),
            page_size: 10,
            log_dir: None,
        }
    }
}

impl ViewerConfig {
    /// Build configuration from `INBOX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("INBOX_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.api_url);

        let enrich_concurrency =
            parse_positive(&lookup, "INBOX_ENRICH_CONCURRENCY", defaults.enrich_concurrency)?;
        let page_size = parse_positive(&lookup, "INBOX_PAGE_SIZE", defaults.page_size)?;

        let request_timeout = match lookup("INBOX_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "INBOX_REQUEST_TIMEOUT_SECS".into(),
                    message: format!("expected a whole number of seconds, got {raw:?}"),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => defaults.request_timeout,
        };

        let log_dir = lookup("INBOX_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            enrich_concurrency,
            request_timeout,
            page_size,
            log_dir,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a positive integer, got {raw:?}"),
        }),
    }
}
