//! Rate & Quota Guard (C2, spec §4.2).
//!
//! One [`ProviderQuota`] per provider: a 60-second sliding window of request
//! timestamps plus a UTC-day-scoped daily counter. Mutations are serialized
//! per provider behind a single lock, the same `Arc<RwLock<...>>` convention
//! the teacher uses in `circuit_breaker.rs` for per-resource state.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const FREE_MODEL_DAILY_LIMIT_FREE_TIER: u32 = 50;
pub const FREE_MODEL_DAILY_LIMIT_PAID_TIER: u32 = 1000;
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Admit,
    DenyPerMinute,
    DenyDaily,
    DenyPaymentRequired,
}

#[derive(Debug)]
struct QuotaState {
    window: Vec<Instant>,
    free_requests_today: u32,
    counter_day: Option<chrono::NaiveDate>,
    remaining_credit: Option<f64>,
}

impl Default for QuotaState {
    fn default() -> Self {
        Self {
            window: Vec::new(),
            free_requests_today: 0,
            counter_day: None,
            remaining_credit: None,
        }
    }
}

/// Per-provider admission guard (spec §3 `ProviderQuota`).
pub struct ProviderQuota {
    per_minute_limit: u32,
    daily_limit: u32,
    tracks_daily_quota: bool,
    state: Arc<RwLock<QuotaState>>,
}

impl ProviderQuota {
    pub fn new(per_minute_limit: u32, tracks_daily_quota: bool, is_free_tier: bool) -> Self {
        let daily_limit = if is_free_tier {
            FREE_MODEL_DAILY_LIMIT_FREE_TIER
        } else {
            FREE_MODEL_DAILY_LIMIT_PAID_TIER
        };
        Self {
            per_minute_limit,
            daily_limit,
            tracks_daily_quota,
            state: Arc::new(RwLock::new(QuotaState::default())),
        }
    }

    /// Purge, check, and (on admit) record a slot in the sliding window —
    /// held under a single write lock so purge+check+append is atomic.
    pub async fn try_admit(&self) -> AdmitDecision {
        let now = Instant::now();
        let today = chrono::Utc::now().date_naive();
        let mut state = self.state.write().await;

        state.window.retain(|t| now.duration_since(*t) < WINDOW);
        if state.window.len() as u32 >= self.per_minute_limit {
            return AdmitDecision::DenyPerMinute;
        }

        if state.counter_day != Some(today) {
            state.counter_day = Some(today);
            state.free_requests_today = 0;
        }

        if self.tracks_daily_quota && state.free_requests_today >= self.daily_limit {
            return AdmitDecision::DenyDaily;
        }

        if let Some(credit) = state.remaining_credit {
            if credit < 0.0 {
                return AdmitDecision::DenyPaymentRequired;
            }
        }

        state.window.push(now);
        AdmitDecision::Admit
    }

    /// Called after a successful (or 429) request against a free-tier model
    /// to consume one unit of the daily quota (spec §4.2 point 4).
    pub async fn record_free_tier_usage(&self) {
        let today = chrono::Utc::now().date_naive();
        let mut state = self.state.write().await;
        if state.counter_day != Some(today) {
            state.counter_day = Some(today);
            state.free_requests_today = 0;
        }
        state.free_requests_today += 1;
    }

    pub async fn update_remaining_credit(&self, remaining_credit: Option<f64>) {
        let mut state = self.state.write().await;
        state.remaining_credit = remaining_credit;
    }

    pub async fn free_requests_today(&self) -> u32 {
        self.state.read().await.free_requests_today
    }
}
