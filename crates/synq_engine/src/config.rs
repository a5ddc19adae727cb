//! Configuration for the sync engine.

use crate::model::{DEFAULT_KEY_FIELD, DEFAULT_VERSION_FIELD};
use rand::Rng;
use std::time::Duration;

/// Seven days, the age after which a queued item is considered abandoned.
pub const DEFAULT_QUEUE_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of queued items before the oldest overflow is dead-lettered.
    pub max_queue_size: usize,
    /// Maximum number of dead-letter entries kept; older ones are evicted.
    pub max_dead_letter_size: usize,
    /// Failed attempts after which an item is dead-lettered.
    pub max_retries: u32,
    /// Age after which queued items are purged on load.
    pub queue_expiry: Duration,
    /// Payload field identifying the target row of updates and deletes.
    pub key_field: String,
    /// Payload field carrying the optimistic-concurrency version.
    pub version_field: String,
    /// Connectivity assumed until the platform reports otherwise.
    pub initial_online: bool,
    /// Whether `queue_change` starts a drain when online and idle.
    pub auto_sync: bool,
}

impl EngineConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_queue_size: 1000,
            max_dead_letter_size: 100,
            max_retries: 3,
            queue_expiry: DEFAULT_QUEUE_EXPIRY,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            version_field: DEFAULT_VERSION_FIELD.to_string(),
            initial_online: true,
            auto_sync: true,
        }
    }

    /// Sets the queue capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the dead-letter capacity.
    pub fn with_max_dead_letter_size(mut self, size: usize) -> Self {
        self.max_dead_letter_size = size;
        self
    }

    /// Sets the retry ceiling.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Sets the queue expiry window.
    pub fn with_queue_expiry(mut self, expiry: Duration) -> Self {
        self.queue_expiry = expiry;
        self
    }

    /// Sets the identifying key field.
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Sets the version field.
    pub fn with_version_field(mut self, field: impl Into<String>) -> Self {
        self.version_field = field.into();
        self
    }

    /// Sets the initial connectivity state.
    pub fn with_initial_online(mut self, online: bool) -> Self {
        self.initial_online = online;
        self
    }

    /// Enables or disables draining on enqueue.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Queue expiry in milliseconds.
    pub(crate) fn queue_expiry_millis(&self) -> u64 {
        u64::try_from(self.queue_expiry.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff schedule used by the platform driver between drain passes.
///
/// The engine itself retries an item once per pass; this schedule decides
/// how soon another pass is attempted after one that left retryable
/// failures behind.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of follow-up passes.
    pub max_attempts: u32,
    /// Delay before the first follow-up pass.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5 * 60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no follow-up passes.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
