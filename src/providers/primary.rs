//! Primary provider client (spec §4.1), grounded on `ai/pollinations.py`.
//!
//! Restricted parameter set: only `model`, `messages`, `temperature`,
//! `max_tokens`, and optionally `tools`/`tool_choice` are ever sent — the
//! upstream rejects `top_p`, `frequency_penalty`, `presence_penalty`, `stop`,
//! and `repetition_penalty`.

use super::{
    GenerateTextRequest, HealthIssue, HealthProbe, ProviderClient, ProviderKind,
};
use crate::backoff::{execute_with_retry, LatencyProfile};
use crate::config::{DynamicTimeoutConfig, PrimaryConfig};
use crate::error::ProviderError;
use crate::http_client::HttpTransport;
use crate::models::{ChatCompletion, Message, ModelInfo, ModelsResponse, Tool, ToolChoice};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, REFERER};
use serde::Serialize;
use std::time::Instant;

/// The only model on this provider known to support function calling
/// reliably; tool-bearing requests against any other model retarget here.
const TOOL_CAPABLE_MODEL: &str = "openai";
const AGENT_REFERER: &str = "ai-request-core";

/// Primary attempts only once per request (spec §4.1): its upstream has no
/// sanctioned retry budget, unlike the secondary provider's five.
const MAX_ATTEMPTS: u32 = 1;

#[derive(Serialize, Clone)]
struct PrimaryRequestBody {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

pub struct PrimaryProviderClient {
    transport: HttpTransport,
    config: PrimaryConfig,
    latency: LatencyProfile,
}

impl PrimaryProviderClient {
    pub fn new(config: PrimaryConfig, dynamic_timeout: &DynamicTimeoutConfig) -> Result<Self, ProviderError> {
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

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(REFERER, HeaderValue::from_static(AGENT_REFERER));
        if let Some(token) = &self.config.api_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }
}

#[async_trait::async_trait]
impl ProviderClient for PrimaryProviderClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn supports_tool_calling(&self, model: &str) -> bool {
        model.to_lowercase().contains("openai")
    }

    fn tool_capable_fallback_model(&self) -> &str {
        TOOL_CAPABLE_MODEL
    }

    async fn health_probe(&self) -> HealthProbe {
        let start = Instant::now();
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
        let mut model = request.model.unwrap_or_else(|| self.config.default_model.clone());
        let tools = request.tools;
        let tool_choice = request.tool_choice;

        if tools.is_some() && !self.supports_tool_calling(&model) {
            model = TOOL_CAPABLE_MODEL.to_string();
        }

        let body = PrimaryRequestBody {
            model,
            messages: request.messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            tools,
            tool_choice,
        };

        execute_with_retry(&self.latency, MAX_ATTEMPTS, |timeout| {
            let headers = self.headers();
            let body = &body;
            async move {
                match tokio::time::timeout(timeout, self.transport.post_json("/", headers, body)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                }
            }
        })
        .await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let resp: ModelsResponse = self.transport.get_json("/models", self.headers()).await?;
        Ok(resp.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PrimaryConfig {
        PrimaryConfig {
            base_url: "https://text.pollinations.ai".to_string(),
            api_token: None,
            text_timeout: std::time::Duration::from_secs(30),
            health_timeout: std::time::Duration::from_secs(5),
            rate_limit_per_min: 15,
            default_model: "evil".to_string(),
        }
    }

    #[test]
    fn non_openai_models_are_not_tool_capable() {
        let client = PrimaryProviderClient::new(test_config(), &DynamicTimeoutConfig::default()).unwrap();
        assert!(!client.supports_tool_calling("evil"));
        assert!(client.supports_tool_calling("openai"));
    }
}
