//! Circuit breaker with a single half-open probe and adaptive open duration.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Cap on consecutive probe failures; bounds the open-duration multiplier.
const MAX_PROBE_FAILURES: u32 = 8;

/// Millisecond clock, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock used outside tests.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Lock-free circuit breaker.
///
/// Closed while `opened_at_ms` is negative. Once open, requests are refused
/// until the current open duration elapses; then exactly one caller wins the
/// half-open probe slot. A failed probe widens the open window up to
/// `base × 8`; a success closes the circuit and resets the window to base.
pub struct CircuitBreaker {
    failure_threshold: u32,
    base_open_duration_ms: i64,
    clock: Arc<dyn Clock>,
    consecutive_failures: AtomicU32,
    consecutive_probe_failures: AtomicU32,
    opened_at_ms: AtomicI64,
    current_open_duration_ms: AtomicI64,
    half_open_probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, base_open_duration_ms: u64, clock: Arc<dyn Clock>) -> Self {
        let base = (base_open_duration_ms.max(1)).min(i64::MAX as u64) as i64;
        Self {
            failure_threshold: failure_threshold.max(1),
            base_open_duration_ms: base,
            clock,
            consecutive_failures: AtomicU32::new(0),
            consecutive_probe_failures: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(-1),
            current_open_duration_ms: AtomicI64::new(base),
            half_open_probe_in_flight: AtomicBool::new(false),
        }
    }

    /// Whether the caller may place a request now. In the half-open state
    /// only the caller that wins the CAS on the probe gate gets through.
    pub fn is_request_allowed(&self) -> bool {
        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        if opened_at < 0 {
            return true;
        }
        let elapsed = self.clock.now_ms().saturating_sub(opened_at);
        if elapsed < self.current_open_duration_ms.load(Ordering::Acquire) {
            return false;
        }
        self.half_open_probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record a successful call: the circuit closes and all counters reset.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_probe_failures.store(0, Ordering::Release);
        self.current_open_duration_ms
            .store(self.base_open_duration_ms, Ordering::Release);
        self.opened_at_ms.store(-1, Ordering::Release);
        self.half_open_probe_in_flight
            .store(false, Ordering::Release);
    }

    /// Record a failed call. A failed half-open probe widens the open
    /// window; otherwise failures accumulate until the threshold opens the
    /// circuit.
    pub fn record_failure(&self) {
        let now = self.clock.now_ms();

        let was_probe = self
            .half_open_probe_in_flight
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if was_probe {
            let probes = self
                .consecutive_probe_failures
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                    Some(p.saturating_add(1).min(MAX_PROBE_FAILURES))
                })
                .map(|previous| previous.saturating_add(1).min(MAX_PROBE_FAILURES))
                .unwrap_or(MAX_PROBE_FAILURES);
            let widened = self
                .base_open_duration_ms
                .saturating_mul(probes as i64)
                .max(self.base_open_duration_ms);
            self.current_open_duration_ms
                .store(widened, Ordering::Release);
            self.opened_at_ms.store(now, Ordering::Release);
            return;
        }

        let failures = self
            .consecutive_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
                Some(f.saturating_add(1))
            })
            .map(|previous| previous.saturating_add(1))
            .unwrap_or(u32::MAX);
        if failures >= self.failure_threshold {
            self.consecutive_probe_failures.store(0, Ordering::Release);
            self.current_open_duration_ms
                .store(self.base_open_duration_ms, Ordering::Release);
            self.opened_at_ms.store(now, Ordering::Release);
        }
    }

    /// Force the circuit back to its initial closed state.
    pub fn reset(&self) {
        self.record_success();
    }

    /// Milliseconds until the open window elapses; zero when closed or
    /// already half-open.
    pub fn remaining_open_ms(&self) -> u64 {
        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        if opened_at < 0 {
            return 0;
        }
        let deadline =
            opened_at.saturating_add(self.current_open_duration_ms.load(Ordering::Acquire));
        deadline.saturating_sub(self.clock.now_ms()).max(0) as u64
    }

    pub fn is_closed(&self) -> bool {
        self.opened_at_ms.load(Ordering::Acquire) < 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn current_open_duration_ms(&self) -> i64 {
        self.current_open_duration_ms.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("failure_threshold", &self.failure_threshold)
            .field(
                "consecutive_failures",
                &self.consecutive_failures.load(Ordering::Acquire),
            )
            .field(
                "consecutive_probe_failures",
                &self.consecutive_probe_failures.load(Ordering::Acquire),
            )
            .field("opened_at_ms", &self.opened_at_ms.load(Ordering::Acquire))
            .field(
                "current_open_duration_ms",
                &self.current_open_duration_ms.load(Ordering::Acquire),
            )
            .finish()
    }
}
