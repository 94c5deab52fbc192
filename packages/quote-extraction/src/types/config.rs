//! Configuration types for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a previous extraction of identical content is reused.
pub const CACHE_FRESHNESS: Duration = Duration::from_secs(72 * 60 * 60);

/// Page spec used when a profile has none, or an unparseable one.
pub const DEFAULT_PAGE_SPEC: &str = "2";

/// Files of one batch processed at the same time.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No waiting between retries. Useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): base × 2^retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Total attempts including the initial one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Configuration for the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry policy for provider calls.
    pub retry: RetryPolicy,

    /// Freshness window for the extraction cache.
    ///
    /// Default: 72 hours.
    pub cache_freshness: Duration,

    /// Page spec for files with no resolved profile.
    ///
    /// Default: first 2 pages.
    pub default_page_spec: String,

    /// Escalate degenerate results to the full document.
    ///
    /// Default: true.
    pub escalate: bool,

    /// Files of a batch processed concurrently. Each file still retries on
    /// its own; there is no shared rate limiter.
    ///
    /// Default: 3.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cache_freshness: CACHE_FRESHNESS,
            default_page_spec: DEFAULT_PAGE_SPEC.to_string(),
            escalate: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cache freshness window.
    pub fn with_cache_freshness(mut self, freshness: Duration) -> Self {
        self.cache_freshness = freshness;
        self
    }

    /// Set the page spec used without a profile.
    pub fn with_default_page_spec(mut self, spec: impl Into<String>) -> Self {
        self.default_page_spec = spec.into();
        self
    }

    /// Enable or disable escalation.
    pub fn with_escalation(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }

    /// Set batch concurrency (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
