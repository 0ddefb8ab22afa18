//! External collaborator traits (spec §6).
//!
//! Storage and the chat platform are both modeled as `async_trait` traits
//! with no production implementation shipped here — they're owned by
//! whatever process embeds this crate. An in-memory test double of each is
//! provided for integration tests, mirroring how the teacher keeps fakes
//! alongside its trait definitions rather than in a separate test crate.

use crate::models::Message;
use std::collections::HashMap;
use std::sync::Mutex;

/// Read-only history access, append-only reply recording.
///
/// No transactional guarantees beyond "reads reflect all previously
/// completed appends" (spec §6).
#[async_trait::async_trait]
pub trait StorageCollaborator: Send + Sync {
    async fn get_recent_messages(
        &self,
        user_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Vec<Message>;

    async fn append_assistant_reply(
        &self,
        user_id: &str,
        channel_id: &str,
        reply_text: &str,
        metadata: serde_json::Value,
    );
}

/// Inbound/outbound chat-platform adapter. The core only ever calls `send`;
/// reactions are decorative and owned by the adapter (spec §6).
#[async_trait::async_trait]
pub trait ChatPlatformCollaborator: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str);
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str);
    async fn remove_reaction(&self, channel_id: &str, message_id: &str, emoji: &str);
}

/// Inbound chat event handed to the conversation assembler (spec §6).
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    pub attachments: Vec<String>,
}

#[derive(Default)]
struct ChannelLog {
    history: Vec<Message>,
}

/// In-memory test double of [`StorageCollaborator`].
#[derive(Default)]
pub struct InMemoryStorage {
    channels: Mutex<HashMap<(String, String), ChannelLog>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds history directly, bypassing `append_assistant_reply`, so tests
    /// can construct prior conversation state.
    pub fn seed(&self, user_id: &str, channel_id: &str, messages: Vec<Message>) {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry((user_id.to_string(), channel_id.to_string()))
            .or_default()
            .history
            .extend(messages);
    }
}

#[async_trait::async_trait]
impl StorageCollaborator for InMemoryStorage {
    async fn get_recent_messages(
        &self,
        user_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Vec<Message> {
        let channels = self.channels.lock().unwrap();
        match channels.get(&(user_id.to_string(), channel_id.to_string())) {
            Some(log) => {
                let start = log.history.len().saturating_sub(limit);
                log.history[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    async fn append_assistant_reply(
        &self,
        user_id: &str,
        channel_id: &str,
        reply_text: &str,
        _metadata: serde_json::Value,
    ) {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry((user_id.to_string(), channel_id.to_string()))
            .or_default()
            .history
            .push(Message::assistant(reply_text));
    }
}

#[derive(Debug, Clone)]
pub struct RecordedReaction {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub added: bool,
}

/// In-memory test double of [`ChatPlatformCollaborator`] that records every
/// call for assertions.
#[derive(Default)]
pub struct InMemoryChatPlatform {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reactions: Mutex<Vec<RecordedReaction>>,
}

impl InMemoryChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ChatPlatformCollaborator for InMemoryChatPlatform {
    async fn send(&self, channel_id: &str, text: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) {
        self.reactions.lock().unwrap().push(RecordedReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            added: true,
        });
    }

    async fn remove_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) {
        self.reactions.lock().unwrap().push(RecordedReaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            added: false,
        });
    }
}
