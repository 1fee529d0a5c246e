//! Events published while a streamed model response is being assembled.

use serde::Serialize;
use strum::Display;

use crate::error::ErrorCategory;
use crate::types::{FinishReason, ToolCallRecord};

use super::bus::BusEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StreamEventKind {
    #[strum(serialize = "stream_start")]
    Start,
    #[strum(serialize = "stream_content")]
    Content,
    #[strum(serialize = "stream_tool_call")]
    ToolCall,
    #[strum(serialize = "stream_end")]
    End,
    #[strum(serialize = "stream_error")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First chunk of a model call.
    Start,
    /// One content delta, exactly as received.
    Content { delta: String },
    /// The accumulated record at `index` after merging a fragment.
    ToolCall { record: ToolCallRecord, index: u32 },
    End { finish_reason: FinishReason },
    /// A failure while decoding or assembling; `category` tells a bad chunk
    /// from a failing listener or a transport error.
    Error {
        category: ErrorCategory,
        message: String,
    },
}

impl BusEvent for StreamEvent {
    type Kind = StreamEventKind;

    fn kind(&self) -> StreamEventKind {
        match self {
            Self::Start => StreamEventKind::Start,
            Self::Content { .. } => StreamEventKind::Content,
            Self::ToolCall { .. } => StreamEventKind::ToolCall,
            Self::End { .. } => StreamEventKind::End,
            Self::Error { .. } => StreamEventKind::Error,
        }
    }
}
