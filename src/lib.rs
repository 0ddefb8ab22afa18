//! # AI Request Core
//!
//! The routing, rate-limiting, and uniqueness-filtering core behind a chat
//! bot's generative-AI features. This crate owns none of the chat-platform
//! plumbing itself — no gateway, no HTTP surface, no admin dashboard — it is
//! the subsystem a chat-platform adapter calls into for a single turn.
//!
//! ## Request flow
//!
//! ```text
//! chat-platform adapter
//!   -> Conversation Assembler   (C6, assembler.rs)
//!   -> Response-Uniqueness Filter (C5, uniqueness.rs)
//!   -> Provider Router          (C4, router.rs)
//!   -> Rate & Quota Guard + Backoff/Timeout Controller (C2/C3, rate_limit.rs, backoff.rs)
//!   -> Provider Client          (C1, providers/primary.rs, providers/secondary.rs)
//!   -> remote provider
//! ```
//!
//! On return the reply flows back through the filter, which records the
//! reply's fingerprint, and the adapter sends it.
//!
//! ## Quick start
//!
//! ```no_run
//! use ai_request_core::{RequestCore, RequestCoreConfig};
//! use ai_request_core::collaborators::{ChatEvent, InMemoryChatPlatform, InMemoryStorage};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let storage = Arc::new(InMemoryStorage::new());
//! let chat_platform = Arc::new(InMemoryChatPlatform::new());
//! let core = RequestCore::from_env(storage, chat_platform, RequestCoreConfig::default())?;
//! let event = ChatEvent {
//!     user_id: "u1".to_string(),
//!     channel_id: "c1".to_string(),
//!     text: "hello".to_string(),
//!     attachments: Vec::new(),
//! };
//! let reply = core.handle_message(&event).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod backoff;
pub mod catalogue;
pub mod collaborators;
pub mod common;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod providers;
pub mod rate_limit;
pub mod router;
pub mod uniqueness;

use assembler::Assembler;
use collaborators::{ChatEvent, ChatPlatformCollaborator, StorageCollaborator};
use config::Config;
use error::RouterError;
use providers::ProviderKind;
use router::{Router, RouteRequest};
use std::sync::Arc;
use uniqueness::{AdvancedSimilarityEngine, SimilarityEngine};

/// Base system prompt used when the caller doesn't supply its own.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant responding in a chat channel.";

/// Per-request knobs a caller may override; everything else comes from
/// [`Config`].
#[derive(Debug, Clone, Default)]
pub struct RequestCoreConfig {
    pub system_prompt: Option<String>,
    pub history_limit: usize,
}

/// Wires the Conversation Assembler, Response-Uniqueness Filter, and
/// Provider Router into a single entry point a chat-platform adapter calls
/// once per incoming message.
pub struct RequestCore {
    router: Router,
    assembler: Assembler,
    similarity: Arc<dyn SimilarityEngine>,
    chat_platform: Arc<dyn ChatPlatformCollaborator>,
    system_prompt: String,
    history_limit: usize,
}

const DEFAULT_HISTORY_LIMIT: usize = 10;

impl RequestCore {
    /// Builds a core from environment-derived configuration (spec §6).
    pub fn from_env(
        storage: Arc<dyn StorageCollaborator>,
        chat_platform: Arc<dyn ChatPlatformCollaborator>,
        overrides: RequestCoreConfig,
    ) -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        Self::new(&config, storage, chat_platform, overrides)
    }

    pub fn new(
        config: &Config,
        storage: Arc<dyn StorageCollaborator>,
        chat_platform: Arc<dyn ChatPlatformCollaborator>,
        overrides: RequestCoreConfig,
    ) -> anyhow::Result<Self> {
        let router = Router::new(config).map_err(|e| anyhow::anyhow!(e))?;
        let similarity: Arc<dyn SimilarityEngine> = Arc::new(AdvancedSimilarityEngine::new());
        let assembler = Assembler::new(storage, Arc::clone(&similarity));

        Ok(Self {
            router,
            assembler,
            similarity,
            chat_platform,
            system_prompt: overrides
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            history_limit: if overrides.history_limit > 0 {
                overrides.history_limit
            } else {
                DEFAULT_HISTORY_LIMIT
            },
        })
    }

    /// Handles one incoming chat event end to end: assembles the
    /// conversation, routes it through the providers, and records the
    /// reply's fingerprint for future uniqueness checks.
    pub async fn handle_message(&self, event: &ChatEvent) -> Result<String, RouterError> {
        let messages = self
            .assembler
            .assemble(event, &self.system_prompt, self.history_limit)
            .await;

        let outcome = self
            .router
            .route_generate_text(RouteRequest {
                messages,
                model: None,
                temperature: 0.7,
                max_tokens: 1000,
                tools: None,
                tool_choice: None,
                preferred_provider: None,
            })
            .await?;

        if outcome.failover {
            tracing::info!(
                provider = %outcome.provider,
                failover_count = outcome.failover_count,
                "replied after failover"
            );
        }

        self.similarity.record_response(&event.user_id, &outcome.text);
        self.chat_platform
            .send(&event.channel_id, &outcome.text)
            .await;

        Ok(outcome.text)
    }

    /// Forces the router's preferred provider for subsequent calls — used
    /// by an operator-facing admin command, not by the normal request path.
    pub async fn override_provider(&self, provider: ProviderKind, model: String) {
        self.router.override_current(provider, model).await;
    }

    pub async fn router_state(&self) -> router::RouterState {
        self.router.current_state().await
    }

    /// Fetches a provider's model catalogue (spec §6), served from the
    /// router's 1h-TTL cache.
    pub async fn list_models(
        &self,
        provider: ProviderKind,
    ) -> Result<Arc<Vec<crate::models::ModelInfo>>, RouterError> {
        self.router.list_models(provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryChatPlatform, InMemoryStorage};

    #[test]
    fn default_system_prompt_is_non_empty() {
        assert!(!DEFAULT_SYSTEM_PROMPT.is_empty());
    }

    #[tokio::test]
    async fn core_builds_with_default_config() {
        let config = Config::default();
        let storage: Arc<dyn StorageCollaborator> = Arc::new(InMemoryStorage::default());
        let chat_platform: Arc<dyn ChatPlatformCollaborator> =
            Arc::new(InMemoryChatPlatform::default());
        let core = RequestCore::new(&config, storage, chat_platform, RequestCoreConfig::default());
        assert!(core.is_ok());
    }

    #[tokio::test]
    async fn router_state_starts_on_secondary() {
        let config = Config::default();
        let storage: Arc<dyn StorageCollaborator> = Arc::new(InMemoryStorage::default());
        let chat_platform: Arc<dyn ChatPlatformCollaborator> =
            Arc::new(InMemoryChatPlatform::default());
        let core =
            RequestCore::new(&config, storage, chat_platform, RequestCoreConfig::default())
                .unwrap();
        let state = core.router_state().await;
        assert_eq!(state.current_provider, ProviderKind::Secondary);
    }
}
