//! Hand-off of tool calls to an executor that runs outside the turn.
//!
//! The engine never awaits the executor itself. It waits on the channel behind
//! each [`DeferredCompletion`], so results are collected in the order they
//! finish, and a completion that outlives its turn is dropped quietly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::arguments::ToolArguments;
use super::tool::{result_to_content, ProgressReporter, Tool, ToolContext};
use super::registry::ResolvedCall;
use crate::error::Result;
use crate::types::{ToolCallRecord, ToolOutcome};

/// Message from a deferred completion back to the waiting turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Progress(ToolOutcome),
    Finished {
        call: ToolCallRecord,
        outcome: ToolOutcome,
    },
}

/// Mints completions bound to one turn's delivery channel.
#[derive(Debug, Clone)]
pub struct DeferredSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl DeferredSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn completion_for(&self, call: &ToolCallRecord) -> DeferredCompletion {
        DeferredCompletion {
            call: call.clone(),
            tx: Some(self.tx.clone()),
        }
    }
}

/// The success/error callback pair for one deferred call.
///
/// `succeed` and `fail` consume the handle, so a result is delivered at most
/// once. Dropping the handle without either delivers an error outcome.
pub struct DeferredCompletion {
    call: ToolCallRecord,
    tx: Option<mpsc::UnboundedSender<Delivery>>,
}

impl DeferredCompletion {
    pub fn tool_call_id(&self) -> &str {
        &self.call.id
    }

    pub fn tool_name(&self) -> &str {
        &self.call.name
    }

    pub fn progress(&self, percent: u8, content: impl Into<String>) {
        let outcome = ToolOutcome::progress(self.call.id.clone(), self.call.name.clone(), percent, content);
        if let Some(tx) = &self.tx {
            if tx.send(Delivery::Progress(outcome)).is_err() {
                debug!(tool_call_id = %self.call.id, "progress after turn ended; dropping");
            }
        }
    }

    /// A cloneable reporter that forwards into [`DeferredCompletion::progress`]'s channel.
    pub fn progress_reporter(&self) -> Option<ProgressReporter> {
        let tx = self.tx.clone()?;
        Some(Arc::new(move |outcome: ToolOutcome| {
            let _ = tx.send(Delivery::Progress(outcome));
        }))
    }

    pub fn succeed(mut self, result: serde_json::Value) {
        let outcome = ToolOutcome::success(
            self.call.id.clone(),
            self.call.name.clone(),
            result_to_content(&result),
        );
        self.deliver(outcome);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        let outcome = ToolOutcome::error(self.call.id.clone(), self.call.name.clone(), message);
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: ToolOutcome) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let delivery = Delivery::Finished {
            call: self.call.clone(),
            outcome,
        };
        if tx.send(delivery).is_err() {
            debug!(
                tool_call_id = %self.call.id,
                tool_name = %self.call.name,
                "deferred result arrived after turn ended; dropping"
            );
        }
    }
}

impl Drop for DeferredCompletion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let outcome = ToolOutcome::error(
                self.call.id.clone(),
                self.call.name.clone(),
                "deferred execution was abandoned without a result",
            );
            self.deliver(outcome);
        }
    }
}

impl fmt::Debug for DeferredCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCompletion")
            .field("call", &self.call)
            .field("delivered", &self.tx.is_none())
            .finish()
    }
}

/// One unit of work submitted to a [`DeferredExecutor`].
pub struct DeferredJob {
    pub call: ToolCallRecord,
    pub arguments: ToolArguments,
    pub tool: Arc<dyn Tool>,
    pub completion: DeferredCompletion,
}

impl DeferredJob {
    pub(crate) fn new(resolved: ResolvedCall, completion: DeferredCompletion) -> Self {
        Self {
            call: resolved.call,
            arguments: resolved.arguments,
            tool: resolved.tool,
            completion,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.call.name
    }

    pub fn tool_call_id(&self) -> &str {
        &self.call.id
    }

    /// Execute the tool and report through the completion.
    pub async fn run(self) {
        let ctx = ToolContext::new(self.call.id.clone(), self.call.name.clone())
            .with_progress(self.completion.progress_reporter());
        match self.tool.execute(&self.arguments, &ctx).await {
            Ok(value) => self.completion.succeed(value),
            Err(err) => self.completion.fail(err.to_string()),
        }
    }
}

impl fmt::Debug for DeferredJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredJob")
            .field("call", &self.call)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Something that runs tool calls independently of the turn, such as a job
/// queue or worker pool.
#[async_trait]
pub trait DeferredExecutor: Send + Sync {
    /// Accept `job`. Must not wait for it to finish.
    async fn submit(&self, job: DeferredJob) -> Result<()>;
}

/// Runs each job on its own Tokio task.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnExecutor;

#[async_trait]
impl DeferredExecutor for SpawnExecutor {
    async fn submit(&self, job: DeferredJob) -> Result<()> {
        debug!(tool_name = %job.tool_name(), tool_call_id = %job.tool_call_id(), "spawning deferred tool");
        tokio::spawn(job.run());
        Ok(())
    }
}
