//! # Retry Policy Module
//!
//! Bounded exponential backoff for transient fan-out transport failures.
//!
//! The policy is an immutable value constructed once at process start and
//! injected into the publisher; per-call state lives in [`RetryState`] for
//! the duration of a single publish and is discarded afterwards.

use std::time::Duration;

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use gridhook_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Publisher default: 3 attempts, delays of 2s and 4s between them
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Total attempts including the first (typically 3-5)
    /// * `base_delay` - Delay after the first failed attempt
    /// * `backoff_multiplier` - Exponential growth factor
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Cap individual delays at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Formula: `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    /// With the defaults this yields 2s, 4s, 8s.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Per-call attempt tracker.
///
/// Exists only for the lifetime of one publish call; discarded on success or
/// final failure.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Attempts made so far (1-based once the first attempt has run)
    pub attempt: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Create state with no attempts made yet
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Record that an attempt has run
    pub fn record_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Delay before the next attempt, per the policy
    pub fn next_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.delay_for(self.attempt)
    }

    /// Check whether the policy permits another attempt
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
