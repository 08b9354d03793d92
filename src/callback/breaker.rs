//! Circuit breaker around the reconciliation pass
//!
//! A tenant outage or database incident makes every pass fail; the breaker
//! keeps that from turning into a sustained storm against all shards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::callback::CallbackService;
use crate::clock::Clock;
use crate::error::{KuryrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: usize,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: usize,
    /// How long an open circuit rejects before probing.
    pub cooldown_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown_period: Duration::from_secs(30),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_millis: u64,
}

/// `CallbackService` decorator implementing closed/open/half-open gating.
pub struct CircuitBreakerService {
    inner: Arc<dyn CallbackService>,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerService {
    pub fn new(
        inner: Arc<dyn CallbackService>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_millis: 0,
            }),
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gate before forwarding. Returns the rejection when the circuit is
    /// open and still cooling down.
    fn check(&self) -> Result<()> {
        let mut state = self.lock();
        if state.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = self.clock.now_millis().saturating_sub(state.last_failure_millis);
        if elapsed <= self.config.cooldown_period.as_millis() as u64 {
            return Err(KuryrError::CircuitOpen { failures: state.failure_count });
        }

        state.state = CircuitState::HalfOpen;
        tracing::info!("callback circuit breaker half-open, probing");
        Ok(())
    }

    fn on_success(&self) {
        let mut state = self.lock();
        state.success_count += 1;
        if state.state == CircuitState::HalfOpen
            && state.success_count >= self.config.success_threshold
        {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
            tracing::info!("callback circuit breaker closed");
        }
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        state.success_count = 0;
        state.last_failure_millis = self.clock.now_millis();

        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                tracing::warn!("callback circuit breaker re-opened by probe failure");
            }
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                state.state = CircuitState::Open;
                tracing::error!(
                    failures = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "callback circuit breaker opened"
                );
            }
            _ => {}
        }
    }
}

#[async_trait]
impl CallbackService for CircuitBreakerService {
    async fn send(&self, horizon_millis: i64, batch_size: usize) -> Result<()> {
        self.check()?;

        let result = self.inner.send(horizon_millis, batch_size).await;
        match &result {
            Ok(()) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }
}
