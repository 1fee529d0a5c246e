//! Per-tool choice between inline and deferred execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::deferred::{DeferredExecutor, DeferredJob, DeferredSink};
use super::registry::ToolRegistry;
use super::tool::{result_to_content, ProgressReporter};
use crate::config::EngineConfig;
use crate::error::{ColloquyError, Result};
use crate::types::{ToolCallRecord, ToolOutcome};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Inline,
    Deferred,
}

/// Result of handing one call to the strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Ran inline; the outcome is final.
    Completed(ToolOutcome),
    /// Submitted; the outcome arrives later through the turn's [`DeferredSink`].
    Deferred,
}

/// Callback fired with each terminal outcome.
pub type OutcomeCallback = Arc<dyn Fn(&ToolCallRecord, &ToolOutcome) + Send + Sync>;

pub struct ToolExecutionStrategy {
    default_mode: ExecutionMode,
    overrides: HashMap<String, ExecutionMode>,
    executor: Option<Arc<dyn DeferredExecutor>>,
    on_executed: Vec<OutcomeCallback>,
    on_error: Vec<OutcomeCallback>,
}

impl Default for ToolExecutionStrategy {
    fn default() -> Self {
        Self::new(ExecutionMode::Inline)
    }
}

impl ToolExecutionStrategy {
    pub fn new(default_mode: ExecutionMode) -> Self {
        Self {
            default_mode,
            overrides: HashMap::new(),
            executor: None,
            on_executed: Vec::new(),
            on_error: Vec::new(),
        }
    }

    /// Default mode and per-tool overrides from config. No executor is attached.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut strategy = Self::new(config.default_execution);
        for name in &config.deferred_tools {
            strategy.set_mode(name.clone(), ExecutionMode::Deferred);
        }
        for name in &config.inline_tools {
            strategy.set_mode(name.clone(), ExecutionMode::Inline);
        }
        strategy
    }

    pub fn with_executor(mut self, executor: Arc<dyn DeferredExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_mode(mut self, tool_name: impl Into<String>, mode: ExecutionMode) -> Self {
        self.set_mode(tool_name, mode);
        self
    }

    pub fn set_mode(&mut self, tool_name: impl Into<String>, mode: ExecutionMode) {
        self.overrides.insert(tool_name.into(), mode);
    }

    pub fn mode_for(&self, tool_name: &str) -> ExecutionMode {
        self.overrides
            .get(tool_name)
            .copied()
            .unwrap_or(self.default_mode)
    }

    pub fn should_defer(&self, tool_name: &str) -> bool {
        self.mode_for(tool_name) == ExecutionMode::Deferred
    }

    /// Called with every successful terminal outcome, inline or deferred.
    pub fn on_executed<F>(&mut self, callback: F)
    where
        F: Fn(&ToolCallRecord, &ToolOutcome) + Send + Sync + 'static,
    {
        self.on_executed.push(Arc::new(callback));
    }

    /// Called with every error outcome, inline or deferred.
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: Fn(&ToolCallRecord, &ToolOutcome) + Send + Sync + 'static,
    {
        self.on_error.push(Arc::new(callback));
    }

    /// Run or submit one resolved tool call.
    ///
    /// Unknown tools and bad arguments fail here for both modes. Handler
    /// failures of inline calls come back as error outcomes.
    pub async fn on_tool_call_requested(
        &self,
        registry: &ToolRegistry,
        call: &ToolCallRecord,
        sink: &DeferredSink,
        progress: Option<ProgressReporter>,
    ) -> Result<Dispatch> {
        let resolved = registry.resolve(call)?;

        if self.should_defer(&call.name) {
            let executor = self.executor.as_ref().ok_or_else(|| {
                ColloquyError::InvalidState(format!(
                    "tool '{}' is deferred but no executor is configured",
                    call.name
                ))
            })?;
            debug!(tool_name = %call.name, tool_call_id = %call.id, "submitting deferred tool call");
            executor
                .submit(DeferredJob::new(resolved, sink.completion_for(call)))
                .await?;
            return Ok(Dispatch::Deferred);
        }

        let ctx = resolved.context().with_progress(progress);
        let outcome = match resolved.run(&ctx).await {
            Ok(value) => ToolOutcome::success(&call.id, &call.name, result_to_content(&value)),
            Err(err) if err.is_tool_recoverable() => {
                ToolOutcome::error(&call.id, &call.name, err.to_string())
            }
            Err(err) => return Err(err),
        };
        self.notify(call, &outcome);
        Ok(Dispatch::Completed(outcome))
    }

    /// Fan a terminal outcome out to the registered callbacks.
    pub fn notify(&self, call: &ToolCallRecord, outcome: &ToolOutcome) {
        let callbacks = if outcome.is_error() {
            &self.on_error
        } else {
            &self.on_executed
        };
        for callback in callbacks {
            callback(call, outcome);
        }
    }
}

impl fmt::Debug for ToolExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolExecutionStrategy")
            .field("default_mode", &self.default_mode)
            .field("overrides", &self.overrides)
            .field("executor", &self.executor.as_ref().map(|_| ".."))
            .finish()
    }
}
