//! Normalized tool execution outcomes and their serialized form.

use serde::{Deserialize, Serialize};

use super::message::Message;

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub tool_name: String,
    pub kind: ToolOutcomeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutcomeKind {
    Success { content: String },
    Error { message: String },
    /// Intermediate report; never folded into history.
    Progress { percent: u8, content: String },
}

impl ToolOutcome {
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            kind: ToolOutcomeKind::Success {
                content: content.into(),
            },
        }
    }

    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            kind: ToolOutcomeKind::Error {
                message: message.into(),
            },
        }
    }

    pub fn progress(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        percent: u8,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            kind: ToolOutcomeKind::Progress {
                percent: percent.min(100),
                content: content.into(),
            },
        }
    }

    /// Success and error end a call; progress does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, ToolOutcomeKind::Progress { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ToolOutcomeKind::Error { .. })
    }

    pub fn payload(&self) -> ToolResultPayload {
        let (content, status, progress, error) = match &self.kind {
            ToolOutcomeKind::Success { content } => {
                (content.clone(), ToolStatus::Success, None, None)
            }
            ToolOutcomeKind::Error { message } => {
                (message.clone(), ToolStatus::Error, None, Some(message.clone()))
            }
            ToolOutcomeKind::Progress { percent, content } => {
                (content.clone(), ToolStatus::InProgress, Some(*percent), None)
            }
        };
        ToolResultPayload {
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            content,
            status,
            progress,
            error,
        }
    }

    /// Build the `tool` message that answers the originating call.
    pub fn to_message(&self) -> serde_json::Result<Message> {
        let body = serde_json::to_string(&self.payload())?;
        Ok(Message::tool(self.tool_call_id.clone(), body))
    }
}

/// Wire form of a tool result, used as the `content` of `tool` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    InProgress,
}
