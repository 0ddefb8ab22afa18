//! Secondary provider client (spec §4.1), grounded on `ai/openrouter.py`.
//!
//! Unlike the primary client this one accepts the full OpenAI-style
//! parameter set, plus OpenRouter-specific extensions: a `reasoning` object,
//! provider-routing preferences, a capped fallback-model list, and a user
//! identifier for abuse tracking.

use super::{
    GenerateTextRequest, HealthIssue, HealthProbe, ProviderClient, ProviderKind,
    ProviderQuotaSnapshot,
};
use crate::backoff::{execute_with_retry, LatencyProfile};
use crate::config::{DynamicTimeoutConfig, SecondaryConfig};
use crate::error::ProviderError;
use crate::http_client::HttpTransport;
use crate::models::{ChatCompletion, Message, ModelInfo, ModelsResponse, Reasoning, Tool, ToolChoice};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Five attempts per request (spec §4.1), plus one dedicated retry (outside
/// this budget) when the upstream reports it ignored provider-routing
/// preferences entirely.
const MAX_ATTEMPTS: u32 = 5;

/// Models known to support function calling on this provider (spec §4.1's
/// "function-calling-capable allow-list"), mirrored from the source's
/// `function_calling_models` list.
const FUNCTION_CALLING_MODELS: &[&str] = &[
    "openai/gpt-oss-120b:free",
    "qwen/qwen3-coder:free",
    "xiaomi/mimo-v2-flash:free",
    "mistralai/devstral-2512:free",
    "kwaipilot/kat-coder-pro:free",
    "meta-llama/llama-3.3-70b-instruct:free",
    "mistralai/mistral-small-3.1-24b-instruct:free",
    "nvidia/nemotron-nano-12b-v2-vl:free",
    "nvidia/nemotron-nano-9b-v2:free",
    "nex-agi/deepseek-v3.1-nex-n1:free",
];

const TOOL_CAPABLE_FALLBACK_MODEL: &str = "openai/gpt-oss-120b:free";
const MAX_FALLBACK_MODELS: usize = 3;

#[derive(Serialize, Clone)]
struct SecondaryRequestBody {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    reasoning: Reasoning,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Deserialize)]
struct KeyInfoResponse {
    data: KeyInfoData,
}

#[derive(Deserialize)]
struct KeyInfoData {
    label: Option<String>,
    limit: Option<f64>,
    limit_remaining: Option<f64>,
    #[serde(default)]
    usage: f64,
    #[serde(default)]
    usage_daily: f64,
    #[serde(default)]
    usage_weekly: f64,
    #[serde(default)]
    usage_monthly: f64,
    #[serde(default = "default_true")]
    is_free_tier: bool,
}

fn default_true() -> bool {
    true
}

pub struct SecondaryProviderClient {
    transport: HttpTransport,
    config: SecondaryConfig,
    latency: LatencyProfile,
}

impl SecondaryProviderClient {
    pub fn new(config: SecondaryConfig, dynamic_timeout: &DynamicTimeoutConfig) -> Result<Self, ProviderError> {
        let transport = HttpTransport::new(config.base_url.clone(), config.text_timeout)?;
        let latency = LatencyProfile::new(
            config.text_timeout,
            dynamic_timeout.enabled,
            dynamic_timeout.min,
            dynamic_timeout.max,
            dynamic_timeout.history_size,
        );
        Ok(Self { transport, config, latency })
    }

    async fn execute(&self, body: &SecondaryRequestBody) -> Result<ChatCompletion, ProviderError> {
        execute_with_retry(&self.latency, MAX_ATTEMPTS, |timeout| {
            let headers = self.headers();
            async move {
                match tokio::time::timeout(
                    timeout,
                    self.transport.post_json("/chat/completions", headers, body),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                }
            }
        })
        .await
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        if let Some(site) = &self.config.site_url {
            if let Ok(value) = HeaderValue::from_str(site) {
                headers.insert("HTTP-Referer", value);
            }
        }
        if let Some(app) = &self.config.app_name {
            if let Ok(value) = HeaderValue::from_str(app) {
                headers.insert("X-Title", value);
            }
        }
        headers
    }
}

#[async_trait::async_trait]
impl ProviderClient for SecondaryProviderClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Secondary
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn supports_tool_calling(&self, model: &str) -> bool {
        FUNCTION_CALLING_MODELS.contains(&model)
    }

    fn tool_capable_fallback_model(&self) -> &str {
        TOOL_CAPABLE_FALLBACK_MODEL
    }

    async fn health_probe(&self) -> HealthProbe {
        let start = Instant::now();
        if !self.config.enabled {
            return HealthProbe::Unhealthy {
                kind: HealthIssue::RequestError,
                response_time: start.elapsed(),
            };
        }
        match self.transport.probe("/models", self.headers()).await {
            Ok(()) => HealthProbe::Healthy {
                response_time: start.elapsed(),
            },
            Err(err) => HealthProbe::Unhealthy {
                kind: HealthIssue::from(&err),
                response_time: start.elapsed(),
            },
        }
    }

    async fn generate_text(
        &self,
        request: GenerateTextRequest,
    ) -> Result<ChatCompletion, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::ServiceUnavailable);
        }

        let mut model = request.model.unwrap_or_else(|| self.config.default_model.clone());
        let tools = request.tools;
        if tools.is_some() && !self.supports_tool_calling(&model) {
            model = TOOL_CAPABLE_FALLBACK_MODEL.to_string();
        }

        let models = if request.fallback_models.is_empty() {
            None
        } else {
            Some(
                request
                    .fallback_models
                    .into_iter()
                    .take(MAX_FALLBACK_MODELS)
                    .collect(),
            )
        };

        let body = SecondaryRequestBody {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            repetition_penalty: request.repetition_penalty,
            stop: request.stop,
            tools,
            tool_choice: request.tool_choice,
            reasoning: request.reasoning.unwrap_or_default(),
            provider: request.provider_preferences,
            models,
            user: request.user,
        };

        match self.execute(&body).await {
            Err(ProviderError::ProviderPreferencesIgnored) if body.provider.is_some() => {
                let mut retry_body = body;
                retry_body.provider = None;
                self.execute(&retry_body).await
            }
            other => other,
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        let resp: ModelsResponse = self.transport.get_json("/models", self.headers()).await?;
        Ok(resp.data)
    }

    async fn get_api_limits(&self) -> Result<Option<ProviderQuotaSnapshot>, ProviderError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let resp: KeyInfoResponse = self.transport.get_json("/key", self.headers()).await?;
        let data = resp.data;
        Ok(Some(ProviderQuotaSnapshot {
            label: data.label.unwrap_or_else(|| "unknown".to_string()),
            limit: data.limit,
            limit_remaining: data.limit_remaining,
            usage: data.usage,
            usage_daily: data.usage_daily,
            usage_weekly: data.usage_weekly,
            usage_monthly: data.usage_monthly,
            is_free_tier: data.is_free_tier,
        }))
    }
}
