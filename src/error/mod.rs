//! Error types for colloquy.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all turn-engine operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool_name}: {message}")]
    InvalidArguments { tool_name: String, message: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Turn timed out after {elapsed_ms}ms")]
    TurnTimeout { elapsed_ms: u64 },

    #[error("Event handler failed: {0}")]
    Handler(String),

    #[error("Tool loop exceeded {0} model calls")]
    IterationLimit(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ColloquyError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Api { status, .. } => match status {
                429 | 500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::MalformedChunk(_) => ErrorCategory::Stream,
            Self::UnknownTool(_) | Self::InvalidArguments { .. } => ErrorCategory::ToolResolution,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::TurnTimeout { .. } => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::Handler(_) | Self::IterationLimit(_) | Self::InvalidState(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether the engine folds this error into a `tool` message instead of
    /// failing the turn.
    pub fn is_tool_recoverable(&self) -> bool {
        matches!(self, Self::ToolExecution { .. })
    }

    /// Whether the transport layer may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Transport | ErrorCategory::Server => RecoverySuggestion::RetryTurn,
            ErrorCategory::Api | ErrorCategory::Stream => RecoverySuggestion::CheckServer,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolResolution => RecoverySuggestion::CheckToolDefinitions,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Serialization | ErrorCategory::Internal => RecoverySuggestion::ReportBug,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
