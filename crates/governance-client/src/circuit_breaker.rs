//! Circuit breaker for the indexer endpoint
//!
//! A fetch cycle fans out one query per candidate id. When the indexer is
//! down every one of those queries waits for its own transport error, so after
//! a run of failed cycles the breaker opens and cycles fast-fail with
//! `TransportUnavailable` until `reset_timeout` has passed.
//!
//! ## Transitions
//! - Closed → Open: after `failure_threshold` consecutive failed cycles
//! - Open → HalfOpen: on the first check after `reset_timeout`
//! - HalfOpen → Closed: after `success_threshold` successful cycles
//! - HalfOpen → Open: on any failure

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed cycles before the circuit opens
    pub failure_threshold: u32,
    /// Time spent open before a trial cycle is allowed
    pub reset_timeout: Duration,
    /// Successful trial cycles needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Returned by [`IndexerCircuitBreaker::check`] while the circuit is open.
#[derive(Debug, Clone, thiserror::Error)]
#[error("indexer circuit open, retry in {:.1}s", .retry_in.as_secs_f64())]
pub struct CircuitOpen {
    pub retry_in: Duration,
}

pub struct IndexerCircuitBreaker {
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
}

impl IndexerCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit: Mutex::new(Circuit {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
            config,
        }
    }

    /// Whether a fetch cycle may hit the indexer now.
    pub fn check(&self) -> Result<(), CircuitOpen> {
        let mut circuit = self.circuit.lock();
        if circuit.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = circuit
            .opened_at
            .map(|t| t.elapsed())
            .unwrap_or(self.config.reset_timeout);
        if elapsed >= self.config.reset_timeout {
            info!("Indexer circuit half-open, allowing trial fetch");
            circuit.state = CircuitState::HalfOpen;
            circuit.successes = 0;
            return Ok(());
        }

        Err(CircuitOpen {
            retry_in: self.config.reset_timeout - elapsed,
        })
    }

    pub fn record_success(&self) {
        let mut circuit = self.circuit.lock();
        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.successes += 1;
                if circuit.successes >= self.config.success_threshold {
                    info!("Indexer circuit closed");
                    circuit.state = CircuitState::Closed;
                    circuit.failures = 0;
                    circuit.successes = 0;
                    circuit.opened_at = None;
                }
            }
            CircuitState::Closed | CircuitState::Open => circuit.failures = 0,
        }
    }

    pub fn record_failure(&self) {
        let mut circuit = self.circuit.lock();
        match circuit.state {
            CircuitState::Closed => {
                circuit.failures += 1;
                if circuit.failures >= self.config.failure_threshold {
                    warn!(
                        failures = circuit.failures,
                        "Indexer unreachable, opening circuit"
                    );
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(Instant::now());
                } else {
                    debug!(
                        failures = circuit.failures,
                        threshold = self.config.failure_threshold,
                        "Indexer fetch failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!("Indexer trial fetch failed, reopening circuit");
                circuit.state = CircuitState::Open;
                circuit.successes = 0;
                circuit.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.circuit.lock().state
    }
}

impl Default for IndexerCircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
