//! Circuit breaker guarding external compiler backends.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Opens after `failure_threshold` consecutive failures and lets a trial
/// request through once `reset_timeout` has elapsed.
pub struct CircuitBreaker {
    is_open: AtomicBool,
    failure_count: AtomicU32,
    failure_threshold: u32,
    reset_timeout: Duration,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            is_open: AtomicBool::new(false),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            opened_at: RwLock::new(None),
        }
    }

    pub async fn is_allowed(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        let opened_at = *self.opened_at.read().await;
        if let Some(opened) = opened_at {
            if opened.elapsed() >= self.reset_timeout {
                debug!("Circuit breaker transitioning to half-open");
                return true;
            }
        }

        false
    }

    pub async fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if self.is_open.load(Ordering::Relaxed) {
            info!("Circuit breaker closed after successful request");
            self.is_open.store(false, Ordering::Relaxed);
            *self.opened_at.write().await = None;
        }
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;

        if count >= self.failure_threshold && !self.is_open.load(Ordering::Relaxed) {
            warn!(
                failure_count = count,
                threshold = self.failure_threshold,
                "Circuit breaker opened due to consecutive failures"
            );
            self.is_open.store(true, Ordering::Relaxed);
            *self.opened_at.write().await = Some(Instant::now());
        } else if self.is_open.load(Ordering::Relaxed) {
            // A failed half-open trial restarts the open period.
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    pub async fn state(&self) -> CircuitState {
        if !self.is_open.load(Ordering::Relaxed) {
            return CircuitState::Closed;
        }

        let opened_at = *self.opened_at.read().await;
        match opened_at {
            Some(opened) if opened.elapsed() >= self.reset_timeout => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}
