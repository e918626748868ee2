//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy`] is a plain value applied explicitly at each call site; there
//! is no ambient retry behaviour anywhere in the crate. Between attempt `N`
//! and `N + 1` the policy sleeps
//!
//! ```text
//! base_delay * backoff_multiplier^(N - 1) + uniform(0..=jitter)
//! ```
//!
//! capped at `max_delay`. Jitter is only ever added, so the cumulative wait
//! after `k` failures is never shorter than the sum of the first `k` backoff
//! intervals.
//!
//! Errors are classified through [`Retryable`] (or an explicit closure with
//! [`RetryPolicy::run_when`]). A non-retryable error short-circuits the
//! remaining attempts. Both ways of giving up surface as [`RetryError`], which
//! callers can tell apart from the underlying transient error.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pagesync_core::retry::RetryPolicy;
//! use pagesync_core::Error;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_secs(1)).with_multiplier(2.0);
//! let outcome = policy
//!     .run("fetch", || async { Ok::<_, Error>(42) })
//!     .await;
//! assert_eq!(outcome.map(|done| done.value).ok(), Some(42));
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::Error;
use crate::config::RetryConfig;

/// Classification hook for errors passed through a [`RetryPolicy`].
pub trait Retryable {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        self.is_recoverable()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Successful result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    /// Value produced by the successful attempt.
    pub value: T,
    /// Number of attempts made, including the successful one.
    pub attempts: u32,
    /// Total time spent sleeping between attempts.
    pub waited: Duration,
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E: std::fmt::Display> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },
    /// An attempt failed with an error that must not be retried.
    #[error("permanent failure on attempt {attempt}: {error}")]
    Fatal {
        /// Attempt number (1-based) that produced the error.
        attempt: u32,
        /// The non-retryable error.
        error: E,
    },
}

impl<E: std::fmt::Display> RetryError<E> {
    /// Number of attempts consumed before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// The underlying error from the last attempt.
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }

    /// Unwrap into the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Exponential backoff policy with a bounded attempt budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
    jitter: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Upper bound applied when no explicit `max_delay` is configured.
    const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

    /// Create a policy with `max_attempts` total attempts (at least one).
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_multiplier: 2.0,
            jitter: Duration::ZERO,
            max_delay: Self::DEFAULT_MAX_DELAY.max(base_delay),
        }
    }

    /// Build a policy from the `[retry]` configuration section.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
        .with_multiplier(config.backoff_multiplier)
        .with_jitter(Duration::from_millis(config.jitter_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
    }

    /// Set the growth factor between consecutive delays (floored at 1.0).
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Set the upper bound of the random delay added to each backoff.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Cap individual delays.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    /// Total attempts allowed, including the first.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before attempt `attempt + 1`, excluding jitter.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        (base + Duration::from_millis(fastrand::u64(0..=max_ms))).min(self.max_delay)
    }

    /// Run `operation`, retrying errors that report themselves as retryable.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        operation: F,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute(label, operation, E::is_retryable, E::retry_after)
            .await
    }

    /// Run `operation` with an explicit `is_retryable` classifier.
    pub async fn run_when<T, E, F, Fut, C>(
        &self,
        label: &str,
        operation: F,
        is_retryable: C,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: Fn(&E) -> bool,
    {
        self.execute(label, operation, is_retryable, |_| None).await
    }

    async fn execute<T, E, F, Fut, C, H>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: C,
        retry_after: H,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: Fn(&E) -> bool,
        H: Fn(&E) -> Option<Duration>,
    {
        let mut attempt = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                        waited,
                    });
                },
                Err(error) if !is_retryable(&error) => {
                    debug!(label, attempt, error = %error, "Permanent failure, not retrying");
                    return Err(RetryError::Fatal { attempt, error });
                },
                Err(error) if attempt >= self.max_attempts => {
                    warn!(
                        label,
                        attempts = attempt,
                        error = %error,
                        "Retry budget exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                },
                Err(error) => {
                    let mut delay = self.jittered(attempt);
                    if let Some(hint) = retry_after(&error) {
                        delay = delay.max(hint);
                    }
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                },
            }
        }
    }
}
