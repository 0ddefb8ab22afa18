//! Provider Router — Failover Core (C4, spec §4.4).
//!
//! The central state machine. Replaces the teacher's generic
//! `routing::Router`/`RoutingStrategy` (condition-matching over arbitrary
//! provider lists) and `circuit_breaker::CircuitBreaker` with a closed,
//! two-provider state machine whose restoration timer is an explicit,
//! cancellable `tokio::task::JoinHandle` (spec §9 redesign note) — the
//! lock-guarded-state-transition idiom is kept from `circuit_breaker.rs`.
//!
//! Same-provider retries belong to C1 (each provider client retries its own
//! transient errors internally, spec §9); this module only ever calls a
//! provider once per attempt and decides whether to move on to the next one.

use crate::catalogue::ModelCatalogue;
use crate::config::Config;
use crate::error::{ProviderError, RouterError, RouterErrorKind};
use crate::models::{ChatCompletion, Message, ModelInfo, Tool, ToolChoice};
use crate::providers::primary::PrimaryProviderClient;
use crate::providers::secondary::SecondaryProviderClient;
use crate::providers::{GenerateTextRequest, HealthProbe, ProviderClient, ProviderKind};
use crate::rate_limit::{AdmitDecision, ProviderQuota};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const SYSTEM_PREFERENCE_ORDER: [ProviderKind; 2] = [ProviderKind::Secondary, ProviderKind::Primary];

#[derive(Debug, Clone)]
pub struct FailoverRecord {
    pub original_provider: ProviderKind,
    pub original_model: String,
    pub fallback_provider: ProviderKind,
    pub fallback_model: String,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
pub struct RouterState {
    pub current_provider: ProviderKind,
    pub current_model: String,
    pub preferred_provider: ProviderKind,
    pub preferred_model: String,
    pub failover_record: Option<FailoverRecord>,
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub provider: ProviderKind,
    pub model: String,
    pub text: String,
    pub failover: bool,
    pub failover_count: u32,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
    pub preferred_provider: Option<ProviderKind>,
}

struct ProviderHandle {
    client: Arc<dyn ProviderClient>,
    quota: Arc<ProviderQuota>,
    catalogue: ModelCatalogue,
    tracks_daily_quota: bool,
}

pub struct Router {
    primary: ProviderHandle,
    secondary: ProviderHandle,
    state: Arc<RwLock<RouterState>>,
    restoration_timer: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
    fallback_restore_enabled: bool,
    fallback_restore_timeout: std::time::Duration,
    failover_count: Arc<std::sync::atomic::AtomicU32>,
}

impl Router {
    pub fn new(config: &Config) -> Result<Self, RouterError> {
        let primary_client = PrimaryProviderClient::new(config.primary.clone(), &config.dynamic_timeout)
            .map_err(|e| RouterError::new(RouterErrorKind::Transient, e.to_string()))?;
        let secondary_client =
            SecondaryProviderClient::new(config.secondary.clone(), &config.dynamic_timeout)
                .map_err(|e| RouterError::new(RouterErrorKind::Transient, e.to_string()))?;

        let primary_client: Arc<dyn ProviderClient> = Arc::new(primary_client);
        let secondary_client: Arc<dyn ProviderClient> = Arc::new(secondary_client);

        let primary = ProviderHandle {
            catalogue: ModelCatalogue::new(Arc::clone(&primary_client)),
            client: primary_client,
            quota: Arc::new(ProviderQuota::new(config.primary.rate_limit_per_min, false, false)),
            tracks_daily_quota: false,
        };

        let secondary = ProviderHandle {
            catalogue: ModelCatalogue::new(Arc::clone(&secondary_client)),
            client: secondary_client,
            quota: Arc::new(ProviderQuota::new(config.secondary.rate_limit_per_min, true, true)),
            tracks_daily_quota: true,
        };

        let preferred_provider = ProviderKind::Secondary;
        let preferred_model = secondary.client.default_model().to_string();

        Ok(Self {
            state: Arc::new(RwLock::new(RouterState {
                current_provider: preferred_provider,
                current_model: preferred_model.clone(),
                preferred_provider,
                preferred_model,
                failover_record: None,
            })),
            primary,
            secondary,
            restoration_timer: Arc::new(AsyncMutex::new(None)),
            fallback_restore_enabled: config.fallback_restore.enabled,
            fallback_restore_timeout: config.fallback_restore.timeout,
            failover_count: Arc::new(std::sync::atomic::AtomicU32::new(0)),
        })
    }

    fn handle(&self, kind: ProviderKind) -> &ProviderHandle {
        match kind {
            ProviderKind::Primary => &self.primary,
            ProviderKind::Secondary => &self.secondary,
        }
    }

    pub async fn current_state(&self) -> RouterState {
        self.state.read().await.clone()
    }

    /// Returns a provider's model catalogue (spec §6 `GET /models`), served
    /// from the 1h-TTL cache in `catalogue.rs` rather than hitting the
    /// upstream on every call.
    pub async fn list_models(&self, kind: ProviderKind) -> Result<Arc<Vec<ModelInfo>>, RouterError> {
        self.handle(kind).catalogue.get().await.map_err(|err| {
            RouterError::new(RouterErrorKind::from_provider_error(&err), format!("{kind}: {err}"))
        })
    }

    fn attempt_order(&self, preferred: Option<ProviderKind>) -> Vec<ProviderKind> {
        let mut order = Vec::with_capacity(2);
        if let Some(p) = preferred {
            order.push(p);
        }
        for kind in SYSTEM_PREFERENCE_ORDER {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }

    /// route_generate_text (spec §4.4): tries each provider in order,
    /// admitting through C2 and shaping the request per-provider, until one
    /// succeeds or every provider has been tried.
    pub async fn route_generate_text(
        &self,
        request: RouteRequest,
    ) -> Result<RouteOutcome, RouterError> {
        let order = self.attempt_order(request.preferred_provider);
        let mut last_error: Option<RouterError> = None;

        for (position, kind) in order.iter().copied().enumerate() {
            let handle = self.handle(kind);

            match handle.quota.try_admit().await {
                AdmitDecision::Admit => {}
                AdmitDecision::DenyPerMinute => {
                    return Err(RouterError::new(
                        RouterErrorKind::RateLimitedLocal,
                        format!("{kind} denied admission: per-minute limit reached"),
                    ));
                }
                AdmitDecision::DenyDaily => {
                    tracing::info!(provider = %kind, "skipping provider: daily quota exhausted");
                    last_error = Some(RouterError::new(
                        RouterErrorKind::QuotaExhausted,
                        format!("{kind}: daily quota exhausted"),
                    ));
                    continue;
                }
                AdmitDecision::DenyPaymentRequired => {
                    tracing::info!(provider = %kind, "skipping provider: payment required");
                    last_error = Some(RouterError::new(
                        RouterErrorKind::PaymentRequired,
                        format!("{kind}: payment required"),
                    ));
                    continue;
                }
            }

            let mut model = request
                .model
                .clone()
                .unwrap_or_else(|| handle.client.default_model().to_string());
            if request.tools.is_some() && !handle.client.supports_tool_calling(&model) {
                tracing::info!(
                    provider = %kind,
                    requested_model = %model,
                    substituted_model = handle.client.tool_capable_fallback_model(),
                    "retargeting to tool-capable model"
                );
                model = handle.client.tool_capable_fallback_model().to_string();
            }

            let gen_request = GenerateTextRequest {
                messages: request.messages.clone(),
                model: Some(model.clone()),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                tools: request.tools.clone(),
                tool_choice: request.tool_choice.clone(),
                ..GenerateTextRequest::new(Vec::new())
            };
            let is_free_tier_model = model.ends_with(":free");

            match handle.client.generate_text(gen_request).await {
                Ok(completion) => {
                    if handle.tracks_daily_quota && is_free_tier_model {
                        handle.quota.record_free_tier_usage().await;
                    }
                    return Ok(self
                        .finish_success(kind, model, completion, position == 0)
                        .await);
                }
                Err(err) => {
                    if matches!(err, ProviderError::RateLimit) && handle.tracks_daily_quota {
                        handle.quota.record_free_tier_usage().await;
                    }
                    tracing::warn!(provider = %kind, error = %err, "provider error");
                    last_error = Some(RouterError::new(
                        RouterErrorKind::from_provider_error(&err),
                        format!("{kind}: {err}"),
                    ));
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RouterError::new(RouterErrorKind::AllProvidersFailed, "no provider attempted")
        }))
    }

    async fn finish_success(
        &self,
        kind: ProviderKind,
        model: String,
        completion: ChatCompletion,
        is_first_attempt: bool,
    ) -> RouteOutcome {
        let text = completion.first_text().unwrap_or_default().to_string();

        if is_first_attempt {
            self.on_preferred_success(kind, model.clone()).await;
            return RouteOutcome {
                provider: kind,
                model,
                text,
                failover: false,
                failover_count: self.failover_count.load(std::sync::atomic::Ordering::SeqCst),
            };
        }

        let count = self
            .failover_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        tracing::info!(provider = %kind, model = %model, failover_count = count, "request succeeded after failover");
        self.on_failover_success(kind, model.clone()).await;
        RouteOutcome {
            provider: kind,
            model,
            text,
            failover: true,
            failover_count: count,
        }
    }

    async fn on_preferred_success(&self, kind: ProviderKind, model: String) {
        let mut state = self.state.write().await;
        if state.failover_record.is_none() {
            state.current_provider = kind;
            state.current_model = model;
        }
    }

    async fn on_failover_success(&self, kind: ProviderKind, model: String) {
        let preferred = {
            let state = self.state.read().await;
            (state.preferred_provider, state.preferred_model.clone())
        };

        {
            let mut state = self.state.write().await;
            state.current_provider = kind;
            state.current_model = model.clone();
            state.failover_record = Some(FailoverRecord {
                original_provider: preferred.0,
                original_model: preferred.1,
                fallback_provider: kind,
                fallback_model: model,
                started_at: Instant::now(),
            });
        }

        self.schedule_restoration(preferred.0).await;
    }

    async fn schedule_restoration(&self, preferred_provider: ProviderKind) {
        if !self.fallback_restore_enabled {
            return;
        }

        let mut timer_slot = self.restoration_timer.lock().await;
        if let Some(handle) = timer_slot.take() {
            handle.abort();
        }

        let state = Arc::clone(&self.state);
        let cooldown = self.fallback_restore_timeout;
        let preferred_client = Arc::clone(&self.handle(preferred_provider).client);

        let task = tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let probe = preferred_client.health_probe().await;
            if matches!(probe, HealthProbe::Healthy { .. }) {
                let mut state = state.write().await;
                let preferred_model = state.preferred_model.clone();
                state.current_provider = preferred_provider;
                state.current_model = preferred_model;
                state.failover_record = None;
                tracing::info!(provider = %preferred_provider, "restored preferred provider after cooldown");
            }
        });

        *timer_slot = Some(task);
    }

    /// A manual model/provider override cancels any outstanding restoration
    /// and returns the router to NORMAL immediately (spec §4.4 state machine).
    pub async fn override_current(&self, provider: ProviderKind, model: String) {
        let mut timer_slot = self.restoration_timer.lock().await;
        if let Some(handle) = timer_slot.take() {
            handle.abort();
        }
        let mut state = self.state.write().await;
        state.current_provider = provider;
        state.current_model = model;
        state.failover_record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_order_places_caller_preference_first() {
        let config = Config::default();
        let router = Router::new(&config).unwrap();
        let order = router.attempt_order(Some(ProviderKind::Primary));
        assert_eq!(order[0], ProviderKind::Primary);
        assert_eq!(order[1], ProviderKind::Secondary);
    }

    #[test]
    fn default_attempt_order_is_secondary_then_primary() {
        let config = Config::default();
        let router = Router::new(&config).unwrap();
        let order = router.attempt_order(None);
        assert_eq!(order, vec![ProviderKind::Secondary, ProviderKind::Primary]);
    }

    #[tokio::test]
    async fn initial_state_targets_secondary() {
        let config = Config::default();
        let router = Router::new(&config).unwrap();
        let state = router.current_state().await;
        assert_eq!(state.current_provider, ProviderKind::Secondary);
        assert!(state.failover_record.is_none());
    }

    #[tokio::test]
    async fn manual_override_clears_failover_record() {
        let config = Config::default();
        let router = Router::new(&config).unwrap();
        router
            .override_current(ProviderKind::Primary, "evil".to_string())
            .await;
        let state = router.current_state().await;
        assert_eq!(state.current_provider, ProviderKind::Primary);
        assert!(state.failover_record.is_none());
    }
}
