//! breaker.rs
//!
//! Circuit breaker in front of the chain RPC endpoint. After enough
//! consecutive failures it stops sending requests for a while, then lets a
//! single trial request through to find out whether the node recovered.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// **Closed**: normal operation, requests go through.
    Closed,
    /// **Open**: too many failures, requests are refused until the timeout passes.
    Open,
    /// **HalfOpen**: timeout passed, one trial request is allowed at a time.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    /// Start of the HalfOpen trial request still awaiting its outcome.
    trial_started_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: RwLock<Inner>,
    /// Consecutive failures.
    failure_count: AtomicU32,
    failure_threshold: u32,
    /// How long to stay Open before moving to HalfOpen.
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self::with_timeout(failure_threshold, Duration::from_secs(timeout_seconds))
    }

    pub fn with_timeout(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                trial_started_at: None,
            }),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            timeout_duration: timeout,
        }
    }

    /// Whether the next request may be sent.
    ///
    /// In HalfOpen only the first caller gets through. Others are refused until
    /// that request is recorded, or until it has been outstanding for a full
    /// timeout, after which another caller takes its place.
    pub fn can_execute(&self) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            // poisoned lock
            return true;
        };

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => match inner.trial_started_at {
                Some(started) if started.elapsed() < self.timeout_duration => false,
                _ => {
                    inner.trial_started_at = Some(Instant::now());
                    true
                }
            },
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.timeout_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started_at = Some(Instant::now());
                    info!("Circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if let Ok(mut inner) = self.inner.write() {
            if inner.state == CircuitState::HalfOpen {
                info!("Circuit breaker recovered - transitioning to Closed state");
            }
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.trial_started_at = None;
        }
    }

    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        match inner.state {
            CircuitState::Closed if failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    failure_count, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_started_at = None;
                warn!("Circuit breaker trial request failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .read()
            .map(|inner| inner.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}
