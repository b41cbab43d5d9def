//! Resilience patterns for clima-runtime.
//!
//! This module provides:
//! - Error classification at the call boundary
//! - Retry with jittered multiplicative backoff
//! - Circuit breaker for persistent rate limiting

mod circuit_breaker;
mod classify;
mod retry;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{CallError, Classify, ErrorClass};
pub use retry::{
    execute_with_retry, CallKind, JitteredBackoff, ResilientExecutor, RetryOptions,
    RetryOptionsError, FAIL_FAST_ATTEMPT,
};
