//! Provider abstraction (spec §4.1, redesign note in §9).
//!
//! The teacher's module here was a dynamic, string-keyed `create_provider(name)`
//! factory over a dozen vendor implementations. This system only ever talks to
//! two fixed upstreams, each with its own shaping rules, so the factory is
//! replaced by a closed `ProviderKind` enum and a `ProviderClient` trait with
//! exactly two implementations.

pub mod primary;
pub mod secondary;

use crate::error::ProviderError;
use crate::models::{ChatCompletion, Message, ModelInfo, Reasoning, Tool, ToolChoice};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which of the two upstream providers a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Primary,
    Secondary,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request shape accepted by both provider clients; each client strips the
/// fields its upstream does not support before serializing (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct GenerateTextRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
    /// Secondary-provider-only extensions (spec §4.1); ignored by the
    /// primary client, which accepts only the fields above.
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub reasoning: Option<Reasoning>,
    pub provider_preferences: Option<serde_json::Value>,
    /// Capped at 3 by the secondary client before transmission.
    pub fallback_models: Vec<String>,
    pub user: Option<String>,
}

impl GenerateTextRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            temperature: 0.7,
            max_tokens: 1000,
            tools: None,
            tool_choice: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            repetition_penalty: None,
            stop: None,
            reasoning: None,
            provider_preferences: None,
            fallback_models: Vec::new(),
            user: None,
        }
    }
}

/// Outcome of a health probe against a provider's model-catalogue endpoint.
#[derive(Debug, Clone)]
pub enum HealthProbe {
    Healthy { response_time: Duration },
    Unhealthy { kind: HealthIssue, response_time: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    Unauthorized,
    RateLimited,
    BadGateway,
    ServiceUnavailable,
    Timeout,
    ConnectionError,
    Http(u16),
    RequestError,
}

impl From<&ProviderError> for HealthIssue {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::InvalidApiKey => HealthIssue::Unauthorized,
            ProviderError::RateLimit => HealthIssue::RateLimited,
            ProviderError::ServiceUnavailable => HealthIssue::BadGateway,
            ProviderError::Timeout => HealthIssue::Timeout,
            ProviderError::Api { code, .. } => HealthIssue::Http(*code),
            ProviderError::Http(_) => HealthIssue::ConnectionError,
            _ => HealthIssue::RequestError,
        }
    }
}

/// Snapshot of a provider's quota/usage, as surfaced by the secondary
/// provider's key-info endpoint (spec §4.1 supplemental fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQuotaSnapshot {
    pub label: String,
    pub limit: Option<f64>,
    pub limit_remaining: Option<f64>,
    pub usage: f64,
    pub usage_daily: f64,
    pub usage_weekly: f64,
    pub usage_monthly: f64,
    pub is_free_tier: bool,
}

/// Common operations every provider client implements (spec §4.1).
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn default_model(&self) -> &str;

    /// True if `model` is known to support function calling for this provider;
    /// used by the router/client to retarget tool-bearing requests.
    fn supports_tool_calling(&self, model: &str) -> bool;

    /// The model to retarget to when tools are requested against a
    /// non-tool-capable model.
    fn tool_capable_fallback_model(&self) -> &str;

    async fn health_probe(&self) -> HealthProbe;

    async fn generate_text(
        &self,
        request: GenerateTextRequest,
    ) -> Result<ChatCompletion, ProviderError>;

    /// Fetches this provider's model catalogue (spec §6 `GET /models`).
    /// The caller (`catalogue.rs`) is responsible for caching; this is a
    /// plain, uncached fetch.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Only the secondary provider implements this meaningfully; the
    /// primary provider has no quota endpoint and returns `Ok(None)`.
    async fn get_api_limits(&self) -> Result<Option<ProviderQuotaSnapshot>, ProviderError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_display_matches_spec_tokens() {
        assert_eq!(ProviderKind::Primary.to_string(), "primary");
        assert_eq!(ProviderKind::Secondary.to_string(), "secondary");
    }

    #[test]
    fn health_issue_from_provider_error() {
        assert_eq!(
            HealthIssue::from(&ProviderError::InvalidApiKey),
            HealthIssue::Unauthorized
        );
        assert_eq!(
            HealthIssue::from(&ProviderError::RateLimit),
            HealthIssue::RateLimited
        );
    }
}
