//! Classification-aware retry with jittered multiplicative backoff.
//!
//! Every external call of the runtime goes through [`ResilientExecutor`].
//! Retryable failures (rate limiting, temporary unavailability) are retried
//! on a [`JitteredBackoff`] schedule; anything else fails on the spot. Callers
//! only ever see a [`CallError`].

use backon::Retryable;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use super::circuit_breaker::{Admission, CircuitBreaker};
use super::classify::{CallError, Classify, ErrorClass};

/// With fail-fast enabled, a rate-limit failure on this attempt (or later) ends the call.
pub const FAIL_FAST_ATTEMPT: u32 = 2;

/// The external calls the runtime makes, used for logging and circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Historical,
    Forecast,
    Plan,
    Projection,
    Comparison,
    Challenges,
    DailyTip,
    ShareSummary,
    Chat,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Historical => "historical",
            CallKind::Forecast => "forecast",
            CallKind::Plan => "plan",
            CallKind::Projection => "projection",
            CallKind::Comparison => "comparison",
            CallKind::Challenges => "challenges",
            CallKind::DailyTip => "daily_tip",
            CallKind::ShareSummary => "share_summary",
            CallKind::Chat => "chat",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryOptionsError {
    #[error("max_retries must be at least 1")]
    ZeroRetries,

    #[error("initial_delay must be greater than zero")]
    ZeroDelay,
}

/// Retry policy for one kind of call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total number of attempts, the first one included
    pub max_retries: u32,

    /// Wait before the second attempt
    #[serde(with = "crate::config::duration_str")]
    pub initial_delay: Duration,

    /// Give up on persistent rate limiting after the second attempt
    pub fail_fast_on_rate_limit: bool,

    /// Ceiling for a single wait; `None` lets the delay grow without bound
    #[serde(with = "crate::config::option_duration_str")]
    pub max_delay: Option<Duration>,

    /// Upper bound (exclusive) of the random amount added at each step
    #[serde(with = "crate::config::duration_str")]
    pub jitter: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_delay: Duration::from_secs(8),
            fail_fast_on_rate_limit: false,
            max_delay: Some(Duration::from_secs(60)),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryOptions {
    /// A policy with the given attempt count and first delay, other fields defaulted.
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Default::default()
        }
    }

    pub fn fail_fast_on_rate_limit(mut self) -> Self {
        self.fail_fast_on_rate_limit = true;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), RetryOptionsError> {
        if self.max_retries == 0 {
            return Err(RetryOptionsError::ZeroRetries);
        }
        if self.initial_delay.is_zero() {
            return Err(RetryOptionsError::ZeroDelay);
        }
        Ok(())
    }

    /// The wait schedule for this policy.
    pub fn backoff(&self) -> JitteredBackoff {
        JitteredBackoff::new(self)
    }
}

/// Wait schedule between attempts.
///
/// Yields `max_retries - 1` delays. The first is `initial_delay`; each next
/// one is `previous * 1.5 + uniform[0, jitter)`, clamped to `max_delay`.
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    next: Duration,
    remaining: u32,
    jitter_nanos: u64,
    max_delay: Option<Duration>,
}

impl JitteredBackoff {
    pub fn new(options: &RetryOptions) -> Self {
        Self {
            next: clamp(options.initial_delay, options.max_delay),
            remaining: options.max_retries.saturating_sub(1),
            jitter_nanos: u64::try_from(options.jitter.as_nanos()).unwrap_or(u64::MAX),
            max_delay: options.max_delay,
        }
    }
}

impl Iterator for JitteredBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next;
        let jitter = if self.jitter_nanos == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter_nanos)
        };
        // ceil(current * 1.5) keeps the growth bound exact at nanosecond precision
        let grown = (current.as_nanos() * 3).div_ceil(2) + u128::from(jitter);
        let grown = Duration::from_nanos(u64::try_from(grown).unwrap_or(u64::MAX));
        self.next = clamp(grown, self.max_delay);

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

fn clamp(delay: Duration, max_delay: Option<Duration>) -> Duration {
    match max_delay {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Run `operation` under `options`, translating the outcome into a [`CallError`].
///
/// - Non-retryable failures end the call after that attempt.
/// - Retryable failures are retried until `max_retries` attempts were made.
/// - With `fail_fast_on_rate_limit`, a rate-limit failure on attempt 2 or
///   later ends the call even when attempts remain.
/// - A failure carrying [`Classify::retry_after`] waits at least that long
///   before the next attempt.
///
/// The final error is translated from the classification of the last failure.
pub async fn execute_with_retry<T, E, Fut, F>(
    operation: F,
    options: &RetryOptions,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    if let Err(e) = options.validate() {
        return Err(CallError::UnexpectedFailure {
            detail: e.to_string(),
        });
    }

    let max_attempts = options.max_retries;
    let fail_fast = options.fail_fast_on_rate_limit;
    let max_delay = options.max_delay;
    let attempts = AtomicU32::new(0);

    let result = operation
        .retry(options.backoff())
        .sleep(tokio::time::sleep)
        .when(|e: &E| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match e.classify() {
                ErrorClass::NonRetryable => {
                    tracing::error!(attempt, error = %e, "Non-retryable error, failing fast");
                    false
                }
                ErrorClass::RateLimited if fail_fast && attempt >= FAIL_FAST_ATTEMPT => {
                    tracing::error!(
                        attempt,
                        error = %e,
                        "Rate limit persisted, failing now to let the caller back off"
                    );
                    false
                }
                _ => true,
            }
        })
        .adjust(|e: &E, delay: Option<Duration>| {
            // A server-requested wait raises the next delay, within max_delay
            delay.map(|d| match e.retry_after() {
                Some(wait) => d.max(clamp(wait, max_delay)),
                None => d,
            })
        })
        .notify(|e: &E, delay: Duration| {
            tracing::warn!(
                attempt = attempts.load(Ordering::Relaxed),
                max_attempts,
                delay = ?delay,
                error = %e,
                "Retryable error, backing off"
            );
        })
        .await;

    result.map_err(|e| {
        let class = e.classify();
        if class.is_retryable() {
            tracing::error!(
                attempts = attempts.load(Ordering::Relaxed),
                max_attempts,
                error = %e,
                "Call failed after retries"
            );
        }
        CallError::from_class(class, e.to_string())
    })
}

/// Retry executor shared by every component that calls out.
///
/// Optionally consults a [`CircuitBreaker`]: while the circuit for a call
/// kind is open, calls of that kind fail immediately with
/// [`CallError::RateLimitExceeded`] and no attempt is made. While half-open
/// only one call (the probe) runs at a time. A call that ends rate-limited
/// counts as a breaker failure; a success closes the circuit.
#[derive(Clone, Default)]
pub struct ResilientExecutor {
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilientExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_circuit_breaker(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker: Some(breaker),
        }
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Run one external call of the given kind.
    pub async fn execute<T, E, Fut, F>(
        &self,
        kind: CallKind,
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut _probe = None;
        if let Some(breaker) = &self.breaker {
            match breaker.admit(kind) {
                None => {
                    tracing::error!(kind = %kind, "Circuit open, not calling the backend");
                    return Err(CallError::RateLimitExceeded {
                        detail: format!("circuit open for {} calls", kind),
                    });
                }
                Some(Admission::Probe) => {
                    _probe = Some(ProbeGuard {
                        breaker: breaker.as_ref(),
                        kind,
                    })
                }
                Some(Admission::Normal) => {}
            }
        }

        let result = execute_with_retry(operation, options)
            .instrument(tracing::info_span!("call", kind = %kind))
            .await;

        if let Some(breaker) = &self.breaker {
            match &result {
                Ok(_) => breaker.record_success(kind),
                Err(e) if e.is_rate_limit() => breaker.record_failure(kind),
                Err(_) => {}
            }
        }

        result
    }
}

/// Hands the half-open probe back if the call settles without a verdict,
/// including when the call future is dropped.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    kind: CallKind,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.breaker.release_probe(self.kind);
    }
}

impl fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("circuit_breaker", &self.breaker.is_some())
            .finish()
    }
}
