//! Turn-level tool lifecycle events.

use serde::Serialize;
use strum::Display;

use crate::types::{ToolCallRecord, ToolOutcome};

use super::bus::BusEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnEventKind {
    ToolQueued,
    ToolProgress,
    ToolExecuted,
    ToolError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A call was handed to the deferred executor.
    ToolQueued { call: ToolCallRecord },
    ToolProgress { outcome: ToolOutcome },
    ToolExecuted { outcome: ToolOutcome },
    ToolError { outcome: ToolOutcome },
}

impl TurnEvent {
    /// Route an outcome to the matching event.
    pub fn from_outcome(outcome: ToolOutcome) -> Self {
        if !outcome.is_terminal() {
            Self::ToolProgress { outcome }
        } else if outcome.is_error() {
            Self::ToolError { outcome }
        } else {
            Self::ToolExecuted { outcome }
        }
    }
}

impl BusEvent for TurnEvent {
    type Kind = TurnEventKind;

    fn kind(&self) -> TurnEventKind {
        match self {
            Self::ToolQueued { .. } => TurnEventKind::ToolQueued,
            Self::ToolProgress { .. } => TurnEventKind::ToolProgress,
            Self::ToolExecuted { .. } => TurnEventKind::ToolExecuted,
            Self::ToolError { .. } => TurnEventKind::ToolError,
        }
    }
}
