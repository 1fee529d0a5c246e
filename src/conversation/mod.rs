//! Caller-owned conversation record.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ColloquyError, Result};
use crate::types::{Message, Role};

/// Option keys the engine controls per call; never stored on the state.
const DYNAMIC_OPTION_KEYS: &[&str] = &["stream", "tools", "messages", "model"];

/// Model, request options and append-only history of one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredConversation")]
pub struct ConversationState {
    model: String,
    options: serde_json::Map<String, serde_json::Value>,
    messages: Vec<Message>,
    /// Ids of every tool call issued by an assistant message in `messages`.
    #[serde(skip)]
    issued_call_ids: HashSet<String>,
}

#[derive(Deserialize)]
struct StoredConversation {
    model: String,
    #[serde(default)]
    options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    messages: Vec<Message>,
}

impl From<StoredConversation> for ConversationState {
    fn from(stored: StoredConversation) -> Self {
        let issued_call_ids = stored
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls())
            .map(|call| call.id.clone())
            .collect();
        Self {
            model: stored.model,
            options: stored.options,
            messages: stored.messages,
            issued_call_ids,
        }
    }
}

impl ConversationState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            options: serde_json::Map::new(),
            messages: Vec::new(),
            issued_call_ids: HashSet::new(),
        }
    }

    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::system(text));
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set_option(key, value);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn options(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.options
    }

    /// Set a request option such as `temperature`. Keys the engine decides per
    /// call are ignored.
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        if DYNAMIC_OPTION_KEYS.contains(&key.as_str()) {
            warn!(option = %key, "ignoring per-call option on conversation state");
            return;
        }
        self.options.insert(key, value.into());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append one message. A `tool` message must answer a call issued by an
    /// earlier assistant message.
    pub fn append(&mut self, message: Message) -> Result<()> {
        if message.role == Role::Tool {
            let Some(id) = message.tool_call_id.as_deref().filter(|id| !id.is_empty()) else {
                return Err(ColloquyError::InvalidState(
                    "tool message without tool_call_id".to_string(),
                ));
            };
            if !self.issued_call_ids.contains(id) {
                return Err(ColloquyError::InvalidState(format!(
                    "tool message answers unknown call '{id}'"
                )));
            }
        }
        if message.role == Role::Assistant {
            self.issued_call_ids
                .extend(message.tool_calls().iter().map(|call| call.id.clone()));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Text of the most recent assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}
