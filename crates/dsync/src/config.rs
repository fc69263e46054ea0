use std::time::Duration;

use dsync_common::error::{DsyncError, Result};

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_REFRESH_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_UNLOCK_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FORCE_UNLOCK_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_MIN_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_RETRY_MAX_JITTER: Duration = Duration::from_secs(1);

/// Upper bound for every configured duration; keeps deadline arithmetic on
/// `Instant` from overflowing.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

const ENV_ACQUIRE_TIMEOUT: &str = "DSYNC_ACQUIRE_TIMEOUT_MS";
const ENV_REFRESH_CALL_TIMEOUT: &str = "DSYNC_REFRESH_CALL_TIMEOUT_MS";
const ENV_UNLOCK_CALL_TIMEOUT: &str = "DSYNC_UNLOCK_CALL_TIMEOUT_MS";
const ENV_FORCE_UNLOCK_CALL_TIMEOUT: &str = "DSYNC_FORCE_UNLOCK_CALL_TIMEOUT_MS";
const ENV_REFRESH_INTERVAL: &str = "DSYNC_REFRESH_INTERVAL_MS";
const ENV_RETRY_MIN_INTERVAL: &str = "DSYNC_RETRY_MIN_INTERVAL_MS";
const ENV_RETRY_MAX_JITTER: &str = "DSYNC_RETRY_MAX_JITTER_MS";

/// Per-call deadlines for each kind of locker RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub acquire: Duration,
    pub refresh_call: Duration,
    pub unlock_call: Duration,
    pub force_unlock_call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            acquire: DEFAULT_ACQUIRE_TIMEOUT,
            refresh_call: DEFAULT_REFRESH_CALL_TIMEOUT,
            unlock_call: DEFAULT_UNLOCK_CALL_TIMEOUT,
            force_unlock_call: DEFAULT_FORCE_UNLOCK_CALL_TIMEOUT,
        }
    }
}

/// Randomized pause between failed acquisition attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_interval: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_RETRY_MIN_INTERVAL,
            max_jitter: DEFAULT_RETRY_MAX_JITTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsyncConfig {
    pub timeouts: Timeouts,
    pub refresh_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for DsyncConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl DsyncConfig {
    /// Defaults overridden by any `DSYNC_*_MS` variable present in the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let overrides: [(&str, &mut Duration); 7] = [
            (ENV_ACQUIRE_TIMEOUT, &mut config.timeouts.acquire),
            (ENV_REFRESH_CALL_TIMEOUT, &mut config.timeouts.refresh_call),
            (ENV_UNLOCK_CALL_TIMEOUT, &mut config.timeouts.unlock_call),
            (
                ENV_FORCE_UNLOCK_CALL_TIMEOUT,
                &mut config.timeouts.force_unlock_call,
            ),
            (ENV_REFRESH_INTERVAL, &mut config.refresh_interval),
            (ENV_RETRY_MIN_INTERVAL, &mut config.retry.min_interval),
            (ENV_RETRY_MAX_JITTER, &mut config.retry.max_jitter),
        ];

        for (key, slot) in overrides {
            if let Some(value) = lookup(key)
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                *slot = parse_millis(key, value)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            (ENV_ACQUIRE_TIMEOUT, self.timeouts.acquire),
            (ENV_REFRESH_CALL_TIMEOUT, self.timeouts.refresh_call),
            (ENV_UNLOCK_CALL_TIMEOUT, self.timeouts.unlock_call),
            (ENV_FORCE_UNLOCK_CALL_TIMEOUT, self.timeouts.force_unlock_call),
            (ENV_REFRESH_INTERVAL, self.refresh_interval),
        ];

        for (key, value) in required {
            if value.is_zero() || value > MAX_DURATION {
                return Err(invalid(key, value));
            }
        }

        let bounded = [
            (ENV_RETRY_MIN_INTERVAL, self.retry.min_interval),
            (ENV_RETRY_MAX_JITTER, self.retry.max_jitter),
        ];
        for (key, value) in bounded {
            if value > MAX_DURATION {
                return Err(invalid(key, value));
            }
        }

        Ok(())
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn invalid(key: &str, value: Duration) -> DsyncError {
    DsyncError::InvalidConfig {
        key: key.to_string(),
        value: format!("{}ms", value.as_millis()),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| DsyncError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        })
}
