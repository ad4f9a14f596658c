use crate::core::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Backoff applied between transient-failure retries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the second attempt, doubled for every following one
    pub base_backoff_ms: u64,

    /// Upper bound for a single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff_ms: 5,
            max_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Set the base backoff
    pub fn base_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self
    }

    /// Set the backoff cap
    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// No delay between attempts
    pub fn immediate() -> Self {
        Self {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait after the failed `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        if self.base_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let cap = self.max_backoff_ms.max(self.base_backoff_ms);

        let mut backoff = self.base_backoff_ms;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        Duration::from_millis(backoff)
    }
}

/// Defaults used by the transaction entry points
///
/// # Examples
///
/// ```
/// use memotx::TransactionConfig;
///
/// let config = TransactionConfig::default().default_attempts(3);
/// assert_eq!(config.default_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Attempt budget used when a caller does not pass one
    pub default_attempts: usize,

    /// Backoff between attempts
    pub retry: RetryPolicy,

    /// Whether entities start with wrapping enabled
    pub wrap_by_default: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_attempts: 1,
            retry: RetryPolicy::default(),
            wrap_by_default: true,
        }
    }
}

impl TransactionConfig {
    pub const ENV_ATTEMPTS: &'static str = "MEMOTX_ATTEMPTS";
    pub const ENV_BACKOFF_MS: &'static str = "MEMOTX_BACKOFF_MS";
    pub const ENV_MAX_BACKOFF_MS: &'static str = "MEMOTX_MAX_BACKOFF_MS";

    /// Set the default attempt budget
    pub fn default_attempts(mut self, attempts: usize) -> Self {
        self.default_attempts = attempts;
        self
    }

    /// Set the retry backoff
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the initial wrap flag for new entities
    pub fn wrap_by_default(mut self, wrap: bool) -> Self {
        self.wrap_by_default = wrap;
        self
    }

    /// Parse from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Build from `MEMOTX_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(attempts) = parse_var(&lookup, Self::ENV_ATTEMPTS)? {
            config.default_attempts = usize::try_from(attempts).map_err(|e| {
                Error::ConfigError(format!("{}={}: {}", Self::ENV_ATTEMPTS, attempts, e))
            })?;
        }
        if let Some(base) = parse_var(&lookup, Self::ENV_BACKOFF_MS)? {
            config.retry.base_backoff_ms = base;
        }
        if let Some(max) = parse_var(&lookup, Self::ENV_MAX_BACKOFF_MS)? {
            config.retry.max_backoff_ms = max;
        }

        Ok(config)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("{}='{}': {}", name, raw, e))),
    }
}
