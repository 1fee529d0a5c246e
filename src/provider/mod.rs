//! The model call boundary and its OpenAI-compatible implementation.

pub mod format;
pub mod http;
pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;
use crate::error::Result;
use crate::types::{Chunk, CompleteResponse, Message};

/// Stream of chunks for one model call.
pub type ChunkStream = BoxStream<'static, Result<Chunk>>;

/// Tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One model call's inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: serde_json::Map<String, serde_json::Value>,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Snapshot the conversation for a call advertising `tools`.
    pub fn from_state(state: &ConversationState, tools: Vec<ToolDefinition>) -> Self {
        Self {
            model: state.model().to_string(),
            messages: state.messages().to_vec(),
            options: state.options().clone(),
            tools,
        }
    }
}

/// A server that completes conversations.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Whole response in one reply.
    async fn complete(&self, request: &ModelRequest) -> Result<CompleteResponse>;

    /// Response as incrementally delivered chunks.
    async fn stream(&self, request: &ModelRequest) -> Result<ChunkStream>;
}
