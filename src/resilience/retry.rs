//! Bounded retry with exponential jittered backoff, fronted by a circuit
//! breaker. Transient-vs-fatal classification is string-message based.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::breaker::CircuitBreaker;
use crate::error::ReviewError;

/// Lowercased substrings that mark an error as transient.
const RETRYABLE_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "rate",
    "429",
    "tempor",
    "network",
    "connection",
    "unavailable",
];

/// Lowercased substrings that make an error fatal regardless of the
/// transient markers.
const FATAL_MARKERS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "invalid token",
    "authentication",
    "invalid model",
    "bad request",
    "400",
    "401",
    "403",
    "404",
];

/// Whether a message names a non-retryable condition.
pub fn is_fatal_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    FATAL_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Whether a message names a transient condition. Fatal markers override.
pub fn is_retryable_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if FATAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return false;
    }
    RETRYABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// How the executor reads the caller's domain type.
pub trait OutcomeClassifier<T>: Send + Sync {
    fn is_success(&self, value: &T) -> bool;
    fn is_retryable(&self, value: &T) -> bool;
    /// Map a thrown error into the caller's failure value.
    fn failure_from(&self, err: ReviewError) -> T;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 8000,
        }
    }
}

/// Drives an attempt through bounded retries, recording every outcome on
/// the shared breaker.
pub struct RetryExecutor {
    config: RetryConfig,
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self { config, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `attempt` up to `max_attempts` times.
    ///
    /// When the breaker forbids the call and `on_circuit_open` is supplied,
    /// its value is returned without invoking the attempt at all.
    pub async fn execute<T, A, Fut>(
        &self,
        mut attempt: A,
        classifier: &dyn OutcomeClassifier<T>,
        on_circuit_open: Option<&(dyn Fn(u64) -> T + Send + Sync)>,
    ) -> T
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReviewError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt_no = 1u32;

        loop {
            if !self.breaker.is_request_allowed() {
                if let Some(hook) = on_circuit_open {
                    let remaining = self.breaker.remaining_open_ms();
                    debug!("circuit open, short-circuiting ({remaining} ms remaining)");
                    return hook(remaining);
                }
            }

            match attempt().await {
                Ok(value) => {
                    if classifier.is_success(&value) {
                        self.breaker.record_success();
                        return value;
                    }
                    self.breaker.record_failure();
                    if attempt_no < max_attempts && classifier.is_retryable(&value) {
                        self.sleep_backoff(attempt_no).await;
                        attempt_no += 1;
                        continue;
                    }
                    return value;
                }
                Err(err) => {
                    self.breaker.record_failure();
                    let retryable = is_retryable_message(&err.to_string());
                    let failure = classifier.failure_from(err);
                    if attempt_no < max_attempts && retryable {
                        self.sleep_backoff(attempt_no).await;
                        attempt_no += 1;
                        continue;
                    }
                    return failure;
                }
            }
        }
    }

    async fn sleep_backoff(&self, attempt_no: u32) {
        let exponential = exponential_backoff_ms(
            attempt_no,
            self.config.backoff_base_ms,
            self.config.backoff_max_ms,
        );
        let sleep_ms = jittered_ms(exponential, &mut rand::thread_rng());
        debug!("attempt {attempt_no} failed, backing off {sleep_ms} ms");
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
    }
}

/// `min(base << (attempt-1), max)` with the shift clamped to 62.
fn exponential_backoff_ms(attempt_no: u32, base_ms: u64, max_ms: u64) -> u64 {
    let shift = attempt_no.saturating_sub(1).min(62);
    base_ms.saturating_mul(1u64 << shift).min(max_ms)
}

/// Uniform jitter over the upper half of the exponential window: the
/// result is always in `[max(1, exp/2), exp]`.
fn jittered_ms<R: Rng>(exponential_ms: u64, rng: &mut R) -> u64 {
    let half = (exponential_ms / 2).max(1);
    half + rng.gen_range(0..=half)
}
