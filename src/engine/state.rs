use serde::Serialize;
use strum::Display;

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    /// No turn has run yet.
    #[default]
    Idle,
    AwaitingModelResponse,
    ResolvingToolCalls,
    /// Suspended until every deferred call of this round has delivered.
    AwaitingDeferredResults,
    Complete,
    Failed,
    TimedOut,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::TimedOut)
    }
}
