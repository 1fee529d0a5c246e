//! Convenience re-exports for common use.

pub use crate::config::EngineConfig;
pub use crate::conversation::ConversationState;
pub use crate::engine::{TurnEngine, TurnState};
pub use crate::error::{ColloquyError, Result};
pub use crate::events::{EventBus, StreamEvent, StreamEventKind, TurnEvent, TurnEventKind};
pub use crate::provider::{ModelClient, ModelRequest, OpenAiCompatibleClient, ToolDefinition};
pub use crate::stream::StreamAggregator;
pub use crate::tools::{
    DeferredCompletion, DeferredExecutor, DeferredJob, ExecutionMode, FnTool, SpawnExecutor, Tool,
    ToolArguments, ToolContext, ToolExecutionStrategy, ToolParameters, ToolRegistry,
};
pub use crate::types::{Chunk, FinishReason, Message, Role, ToolCallRecord, ToolOutcome};
