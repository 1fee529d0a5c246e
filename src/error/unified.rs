//! Error classification used by callers deciding how to react to a failed turn.

use serde::Serialize;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transport,
    Server,
    Api,
    Stream,
    ToolResolution,
    ToolExecution,
    Timeout,
    Configuration,
    Serialization,
    Internal,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Retry the whole turn later; nothing at this layer retried it.
    RetryTurn,
    CheckServer,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolDefinitions,
    CheckToolImplementation,
    ReportBug,
}
