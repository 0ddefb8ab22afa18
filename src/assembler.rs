//! Conversation Assembler (C6, spec §4.6).
//!
//! Builds the message list handed to the router: system prompt (with
//! per-user uniqueness guidance spliced in), retrieved history, the new
//! user message, filtered through the ordering validator of spec §3.

use crate::collaborators::{ChatEvent, StorageCollaborator};
use crate::models::{Message, Role, ToolCall};
use crate::uniqueness::SimilarityEngine;
use std::sync::Arc;

pub struct Assembler {
    storage: Arc<dyn StorageCollaborator>,
    similarity: Arc<dyn SimilarityEngine>,
}

impl Assembler {
    pub fn new(storage: Arc<dyn StorageCollaborator>, similarity: Arc<dyn SimilarityEngine>) -> Self {
        Self { storage, similarity }
    }

    /// Assembles the full message list for one turn (spec §4.6 steps 1-5).
    pub async fn assemble(
        &self,
        event: &ChatEvent,
        base_system_prompt: &str,
        history_limit: usize,
    ) -> Vec<Message> {
        let system_prompt = self
            .similarity
            .enhance_system_prompt(&event.user_id, base_system_prompt);

        let mut messages = vec![Message::system(system_prompt)];
        let history = self
            .storage
            .get_recent_messages(&event.user_id, &event.channel_id, history_limit)
            .await;
        messages.extend(history);
        messages.push(Message::user(event.text.clone()));

        validate_ordering(messages)
    }
}

/// Drops messages that violate the ordering invariant (spec §3): a system
/// message may appear only as the first message; a tool message is kept
/// only when it directly follows an assistant message whose `tool_calls`
/// contains a matching `id`. Every surviving message gets a non-null
/// (possibly empty) content, already guaranteed by [`Message`]'s type.
pub fn validate_ordering(messages: Vec<Message>) -> Vec<Message> {
    let mut result: Vec<Message> = Vec::with_capacity(messages.len());
    // Tracks the tool_calls of the assistant message currently anchoring a
    // run of tool replies. A run of tool messages stays anchored to the same
    // assistant turn — it must not be re-derived from `result.last()`, which
    // becomes the previous *tool* message once the run is more than one long.
    let mut tool_anchor: Option<Vec<ToolCall>> = None;

    for message in messages {
        match message.role {
            Role::System => {
                if result.is_empty() {
                    result.push(message);
                }
                // A non-leading system message violates the invariant; drop it.
            }
            Role::Tool => {
                let matches_anchor = tool_anchor.as_ref().is_some_and(|calls| {
                    message
                        .tool_call_id
                        .as_deref()
                        .is_some_and(|id| calls.iter().any(|c| c.id == id))
                });
                if matches_anchor {
                    result.push(message);
                }
            }
            Role::User => {
                tool_anchor = None;
                result.push(message);
            }
            Role::Assistant => {
                tool_anchor = message.tool_calls.clone();
                result.push(message);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryStorage;
    use crate::models::{FunctionCall, ToolCall};
    use crate::uniqueness::NoopSimilarityEngine;

    fn event() -> ChatEvent {
        ChatEvent {
            user_id: "u1".to_string(),
            channel_id: "c1".to_string(),
            text: "hello".to_string(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn assembles_system_history_and_new_message_in_order() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.seed("u1", "c1", vec![Message::user("prior"), Message::assistant("reply")]);
        let assembler = Assembler::new(storage, Arc::new(NoopSimilarityEngine));

        let messages = assembler.assemble(&event(), "base prompt", 10).await;

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "prior");
        assert_eq!(messages[2].content, "reply");
        assert_eq!(messages.last().unwrap().content, "hello");
    }

    #[test]
    fn drops_non_leading_system_messages() {
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::system("sneaky"),
        ];
        let validated = validate_ordering(messages);
        assert_eq!(validated.len(), 2);
        assert!(validated.iter().all(|m| m.content != "sneaky"));
    }

    #[test]
    fn keeps_tool_message_directly_after_matching_assistant_call() {
        let tool_calls = vec![ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            },
        }];
        let messages = vec![
            Message::user("what's the weather"),
            Message::assistant_with_tool_calls("", tool_calls),
            Message::tool("call_1", "sunny"),
        ];
        let validated = validate_ordering(messages);
        assert_eq!(validated.len(), 3);
    }

    #[test]
    fn keeps_every_tool_reply_in_a_multi_call_run() {
        let tool_calls = vec![
            ToolCall {
                id: "call_1".to_string(),
                call_type: "function".to_string(),
                function: FunctionCall { name: "lookup".to_string(), arguments: "{}".to_string() },
            },
            ToolCall {
                id: "call_2".to_string(),
                call_type: "function".to_string(),
                function: FunctionCall { name: "lookup".to_string(), arguments: "{}".to_string() },
            },
        ];
        let messages = vec![
            Message::user("what's the weather and the time"),
            Message::assistant_with_tool_calls("", tool_calls),
            Message::tool("call_1", "sunny"),
            Message::tool("call_2", "noon"),
        ];
        let validated = validate_ordering(messages);
        assert_eq!(validated.len(), 4);
        assert!(validated.iter().any(|m| m.content == "sunny"));
        assert!(validated.iter().any(|m| m.content == "noon"));
    }

    #[test]
    fn drops_orphaned_tool_message() {
        let messages = vec![Message::user("hi"), Message::tool("call_x", "result")];
        let validated = validate_ordering(messages);
        assert_eq!(validated.len(), 1);
    }
}
