//! Circuit breaker for persistently rate-limited backends.
//!
//! When calls of one kind keep ending rate-limited, the circuit for that kind
//! opens and further calls fail immediately instead of hammering the backend.
//! After the recovery timeout a single probe call is let through; everyone
//! else keeps failing fast until the probe settles.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::retry::CallKind;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Rate-limited calls in a row before opening the circuit
    pub failure_threshold: u32,

    /// Time before a probe call is allowed
    #[serde(with = "crate::config::duration_str")]
    pub recovery_timeout: Duration,

    /// Successful probes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Calls fail without reaching the backend
    Open { opened_at: Instant },

    /// Probing whether the backend recovered; `probing` while a probe is in flight
    HalfOpen { successes: u32, probing: bool },
}

/// Why a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The circuit is closed
    Normal,

    /// The only call allowed while half-open
    Probe,
}

/// Per-call-kind circuit breaker.
///
/// Each [`CallKind`] has its own circuit so that a throttled chat backend
/// does not block plan generation.
pub struct CircuitBreaker {
    states: RwLock<HashMap<CallKind, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to make a call of this kind.
    ///
    /// Returns `None` while the circuit is open, or while it is half-open and
    /// another caller holds the probe. An open circuit whose recovery timeout
    /// has elapsed moves to half-open and hands the probe to this caller.
    pub fn admit(&self, kind: CallKind) -> Option<Admission> {
        let mut states = self.states.write();
        match states.get(&kind).cloned() {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() < self.config.recovery_timeout {
                    return None;
                }
                states.insert(
                    kind,
                    CircuitState::HalfOpen {
                        successes: 0,
                        probing: true,
                    },
                );
                tracing::info!(kind = %kind, "Circuit half-open, probing backend");
                Some(Admission::Probe)
            }
            Some(CircuitState::HalfOpen { probing: true, .. }) => None,
            Some(CircuitState::HalfOpen { successes, .. }) => {
                states.insert(
                    kind,
                    CircuitState::HalfOpen {
                        successes,
                        probing: true,
                    },
                );
                Some(Admission::Probe)
            }
            _ => Some(Admission::Normal),
        }
    }

    /// Whether a call of this kind would be turned away.
    ///
    /// Same transitions as [`admit`](Self::admit): a `false` answer while
    /// half-open takes the probe.
    pub fn is_open(&self, kind: CallKind) -> bool {
        self.admit(kind).is_none()
    }

    /// Give the probe back without a verdict, so the next caller can probe.
    ///
    /// Used when a probe ends in an error that says nothing about rate
    /// limiting, or never finishes.
    pub fn release_probe(&self, kind: CallKind) {
        let mut states = self.states.write();
        if let Some(CircuitState::HalfOpen {
            successes,
            probing: true,
        }) = states.get(&kind).cloned()
        {
            states.insert(
                kind,
                CircuitState::HalfOpen {
                    successes,
                    probing: false,
                },
            );
        }
    }

    pub fn record_success(&self, kind: CallKind) {
        let mut states = self.states.write();
        match states.get(&kind).cloned() {
            Some(CircuitState::HalfOpen { successes, .. }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(kind, CircuitState::Closed { failures: 0 });
                    tracing::info!(kind = %kind, "Circuit closed after successful probe");
                } else {
                    states.insert(
                        kind,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                            probing: false,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(kind, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, kind: CallKind) {
        let mut states = self.states.write();
        let failures = match states.get(&kind) {
            Some(CircuitState::Closed { failures }) => *failures,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    kind,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(kind = %kind, "Circuit reopened after failed probe");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
            None => 0,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                kind,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                kind = %kind,
                failures = failures + 1,
                "Circuit opened after repeated rate limiting"
            );
        } else {
            states.insert(
                kind,
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    pub fn state(&self, kind: CallKind) -> CircuitState {
        self.states
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Close every circuit.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(CallKind::Plan));
        assert_eq!(cb.state(CallKind::Plan), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let cb = CircuitBreaker::default();

        cb.record_failure(CallKind::Plan);
        cb.record_failure(CallKind::Plan);
        assert!(!cb.is_open(CallKind::Plan));

        cb.record_failure(CallKind::Plan);
        assert!(cb.is_open(CallKind::Plan));
    }

    #[test]
    fn test_threshold_of_one_opens_on_first_failure() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        cb.record_failure(CallKind::Chat);
        assert!(cb.is_open(CallKind::Chat));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();

        cb.record_failure(CallKind::Projection);
        cb.record_failure(CallKind::Projection);
        cb.record_success(CallKind::Projection);

        cb.record_failure(CallKind::Projection);
        cb.record_failure(CallKind::Projection);
        assert!(!cb.is_open(CallKind::Projection));
    }

    #[test]
    fn test_kinds_are_independent() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(CallKind::Chat);
        cb.record_failure(CallKind::Chat);

        assert!(cb.is_open(CallKind::Chat));
        assert!(!cb.is_open(CallKind::Plan));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_goes_through_half_open() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        });

        cb.record_failure(CallKind::Plan);
        assert!(cb.is_open(CallKind::Plan));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cb.is_open(CallKind::Plan));
        assert_eq!(
            cb.state(CallKind::Plan),
            CircuitState::HalfOpen {
                successes: 0,
                probing: true
            }
        );

        // A failed probe reopens
        cb.record_failure(CallKind::Plan);
        assert!(cb.is_open(CallKind::Plan));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cb.is_open(CallKind::Plan));
        cb.record_success(CallKind::Plan);
        assert_eq!(cb.state(CallKind::Plan), CircuitState::Closed { failures: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_a_single_call() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        });
        cb.record_failure(CallKind::Plan);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cb.admit(CallKind::Plan), Some(Admission::Probe));
        assert_eq!(cb.admit(CallKind::Plan), None);
        assert_eq!(cb.admit(CallKind::Plan), None);
        assert_eq!(cb.admit(CallKind::Projection), Some(Admission::Normal));

        // A probe given back without a verdict passes to the next caller
        cb.release_probe(CallKind::Plan);
        assert_eq!(cb.admit(CallKind::Plan), Some(Admission::Probe));
        assert_eq!(cb.admit(CallKind::Plan), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_half_open_call_needs_its_own_admission() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        });
        cb.record_failure(CallKind::Chat);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cb.admit(CallKind::Chat), Some(Admission::Probe));
        cb.record_success(CallKind::Chat);
        assert_eq!(
            cb.state(CallKind::Chat),
            CircuitState::HalfOpen {
                successes: 1,
                probing: false
            }
        );

        assert_eq!(cb.admit(CallKind::Chat), Some(Admission::Probe));
        assert_eq!(cb.admit(CallKind::Chat), None);
        cb.record_success(CallKind::Chat);
        assert_eq!(cb.state(CallKind::Chat), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_release_when_closed_is_a_no_op() {
        let cb = CircuitBreaker::default();
        cb.release_probe(CallKind::Plan);
        assert_eq!(cb.state(CallKind::Plan), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_config_durations_are_human_readable() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"recovery_timeout": "1m 30s"}"#).unwrap();
        assert_eq!(config.recovery_timeout, Duration::from_secs(90));
        assert_eq!(config.failure_threshold, 3);
    }
}
