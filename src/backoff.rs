//! Backoff & Dynamic-Timeout Controller (C3, spec §4.3).
//!
//! Pure computation over a bounded latency history; holds no sockets.
//! Grounded on `_get_dynamic_timeout`/`_record_response_time` in
//! `ai/pollinations.py`: average + 2 standard deviations, clamped to
//! configured bounds, only once at least 5 samples have been observed.

use crate::error::ProviderError;
use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const MIN_SAMPLES: usize = 5;

/// Retry-delay cap for 502/503/504-class (service down) errors (spec §4.3).
const SERVICE_DOWN_RETRY_CAP_SECS: f64 = 8.0;
/// Retry-delay cap for 429 (rate limited) errors — spec §4.3 calls for "a
/// higher cap" than the 502-class one, since a rate limit clears on its own
/// schedule rather than waiting out a restart.
const RATE_LIMIT_RETRY_CAP_SECS: f64 = 30.0;

#[derive(Debug)]
struct LatencyState {
    response_times: VecDeque<Duration>,
    timeout_events: VecDeque<Duration>,
    history_size: usize,
}

impl LatencyState {
    fn new(history_size: usize) -> Self {
        Self {
            response_times: VecDeque::with_capacity(history_size),
            timeout_events: VecDeque::with_capacity(history_size),
            history_size,
        }
    }

    fn push_sample(&mut self, duration: Duration, success: bool) {
        if self.response_times.len() >= self.history_size {
            self.response_times.pop_front();
        }
        self.response_times.push_back(duration);

        if !success {
            if self.timeout_events.len() >= self.history_size {
                self.timeout_events.pop_front();
            }
            self.timeout_events.push_back(duration);
        }
    }

    fn avg_and_stddev(&self) -> Option<(f64, f64)> {
        if self.response_times.len() < MIN_SAMPLES {
            return None;
        }
        let n = self.response_times.len() as f64;
        let avg = self.response_times.iter().map(Duration::as_secs_f64).sum::<f64>() / n;
        let variance = self
            .response_times
            .iter()
            .map(|d| (d.as_secs_f64() - avg).powi(2))
            .sum::<f64>()
            / n;
        Some((avg, variance.sqrt()))
    }
}

/// Per-provider latency history driving the dynamic timeout (spec §3
/// `LatencyProfile`).
pub struct LatencyProfile {
    state: Arc<RwLock<LatencyState>>,
    dynamic_enabled: bool,
    static_timeout: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyProfile {
    pub fn new(
        static_timeout: Duration,
        dynamic_enabled: bool,
        min: Duration,
        max: Duration,
        history_size: usize,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(LatencyState::new(history_size))),
            dynamic_enabled,
            static_timeout,
            min,
            max,
        }
    }

    /// Next request timeout to use: the configured static timeout unless
    /// dynamic mode is enabled and at least 5 samples exist.
    pub async fn next_timeout(&self) -> Duration {
        if !self.dynamic_enabled {
            return self.static_timeout;
        }
        let state = self.state.read().await;
        match state.avg_and_stddev() {
            Some((avg, stddev)) => {
                let target = avg + 2.0 * stddev;
                Duration::from_secs_f64(target.clamp(self.min.as_secs_f64(), self.max.as_secs_f64()))
            }
            None => self.static_timeout,
        }
    }

    pub async fn record(&self, duration: Duration, success: bool) {
        let mut state = self.state.write().await;
        state.push_sample(duration, success);
    }
}

/// Runs `attempt` against `latency`'s dynamic timeout, retrying on
/// `ProviderError::client_retryable` outcomes up to `max_attempts` with
/// exponential backoff between tries (spec §4.1 C1-internal retry
/// discipline; the router never re-invokes the same provider).
pub async fn execute_with_retry<F, Fut, T>(
    latency: &LatencyProfile,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, ProviderError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt_no = 0u32;
    loop {
        let timeout = latency.next_timeout().await;
        let started = Instant::now();
        let result = attempt(timeout).await;

        match result {
            Ok(value) => {
                latency.record(started.elapsed(), true).await;
                return Ok(value);
            }
            Err(err) => {
                latency.record(started.elapsed(), false).await;
                attempt_no += 1;
                if attempt_no >= max_attempts || !err.client_retryable() {
                    return Err(err);
                }
                let cap = match err {
                    ProviderError::RateLimit => RATE_LIMIT_RETRY_CAP_SECS,
                    _ => SERVICE_DOWN_RETRY_CAP_SECS,
                };
                tokio::time::sleep(retry_delay(1.0, attempt_no, Some(cap))).await;
            }
        }
    }
}

/// `delay = base * 2^attempt + U(0,1)` seconds (spec §4.3), optionally capped.
pub fn retry_delay(base_secs: f64, attempt: u32, cap_secs: Option<f64>) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let mut delay = base_secs * 2f64.powi(attempt as i32) + jitter;
    if let Some(cap) = cap_secs {
        delay = delay.min(cap);
    }
    Duration::from_secs_f64(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uses_static_timeout_below_sample_threshold() {
        let profile = LatencyProfile::new(
            Duration::from_secs(30),
            true,
            Duration::from_secs(5),
            Duration::from_secs(60),
            100,
        );
        for _ in 0..4 {
            profile.record(Duration::from_secs(1), true).await;
        }
        assert_eq!(profile.next_timeout().await, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn uses_dynamic_timeout_once_enough_samples() {
        let profile = LatencyProfile::new(
            Duration::from_secs(30),
            true,
            Duration::from_secs(1),
            Duration::from_secs(60),
            100,
        );
        for _ in 0..10 {
            profile.record(Duration::from_secs(2), true).await;
        }
        // stddev is ~0 with identical samples, so timeout should land near 2s.
        let timeout = profile.next_timeout().await;
        assert!(timeout.as_secs_f64() >= 1.9 && timeout.as_secs_f64() <= 2.5);
    }

    #[tokio::test]
    async fn dynamic_timeout_respects_bounds() {
        let profile = LatencyProfile::new(
            Duration::from_secs(30),
            true,
            Duration::from_secs(5),
            Duration::from_secs(10),
            100,
        );
        for _ in 0..10 {
            profile.record(Duration::from_secs(100), true).await;
        }
        assert_eq!(profile.next_timeout().await, Duration::from_secs(10));
    }

    #[test]
    fn retry_delay_grows_exponentially_and_respects_cap() {
        let delay = retry_delay(1.0, 5, Some(8.0));
        assert!(delay.as_secs_f64() <= 8.0);
    }

    #[test]
    fn rate_limit_cap_is_higher_than_service_down_cap() {
        assert!(RATE_LIMIT_RETRY_CAP_SECS > SERVICE_DOWN_RETRY_CAP_SECS);

        // At a large attempt count the exponential term dwarfs both caps, so
        // each cap is the one actually observed in the clamped delay.
        let service_down = retry_delay(1.0, 20, Some(SERVICE_DOWN_RETRY_CAP_SECS));
        let rate_limited = retry_delay(1.0, 20, Some(RATE_LIMIT_RETRY_CAP_SECS));
        assert_eq!(service_down.as_secs_f64(), SERVICE_DOWN_RETRY_CAP_SECS);
        assert_eq!(rate_limited.as_secs_f64(), RATE_LIMIT_RETRY_CAP_SECS);
    }

    #[tokio::test]
    async fn execute_with_retry_gives_up_after_max_attempts() {
        let profile = LatencyProfile::new(Duration::from_millis(1), false, Duration::from_secs(1), Duration::from_secs(2), 10);
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), crate::error::ProviderError> = execute_with_retry(&profile, 3, |_timeout| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(crate::error::ProviderError::ServiceUnavailable) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_with_retry_stops_on_non_retryable_error() {
        let profile = LatencyProfile::new(Duration::from_millis(1), false, Duration::from_secs(1), Duration::from_secs(2), 10);
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), crate::error::ProviderError> = execute_with_retry(&profile, 5, |_timeout| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(crate::error::ProviderError::InvalidApiKey) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
