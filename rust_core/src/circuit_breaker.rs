//! Per-provider circuit breaker.
//!
//! Stops hammering a provider that is down:
//! - Counts consecutive upstream failures (network, timeout, 5xx, 429)
//! - Opens after `failure_threshold` of them and rejects calls immediately
//! - Lets probe calls through (half-open) once `recovery_timeout` has passed
//! - Closes again after `success_threshold` probe successes
//!
//! Malformed payloads do not count: the provider answered, we just could not
//! read part of it.

use crate::error::{MappingError, Result};
use crate::types::Provider;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    provider: Provider,
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(provider: Provider, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// `Ok` if a call may go out now; moves Open to HalfOpen once the
    /// recovery timeout has passed.
    pub fn guard(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        let recovered = inner
            .opened_at
            .map(|t| t.elapsed() >= self.config.recovery_timeout)
            .unwrap_or(true);
        if recovered {
            inner.state = CircuitState::HalfOpen;
            inner.probe_successes = 0;
            info!("{} circuit half-open, probing", self.provider);
            Ok(())
        } else {
            Err(MappingError::unavailable(self.provider, "circuit breaker open"))
        }
    }

    /// Feed the outcome of a guarded call back into the breaker.
    pub fn record<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) if e.is_retryable() => self.record_failure(),
            // The provider answered; keep the streak untouched
            Err(_) => {}
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.probe_successes += 1;
            if inner.probe_successes < self.config.success_threshold {
                return;
            }
            info!(
                "{} circuit closed after {} successful probes",
                self.provider, inner.probe_successes
            );
        }
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures += 1;
        let (state, failures) = (inner.state, inner.consecutive_failures);
        match state {
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                warn!(
                    "{} circuit OPENED after {} consecutive failures",
                    self.provider, failures
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                warn!("{} circuit re-opened during probe", self.provider);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.opened_at = None;
    }
}

// ============================================================================
// Tests
// ============================================================================
