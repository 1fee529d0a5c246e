//! Tool trait and closure-based tool wrapper.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::Result;
use crate::types::ToolOutcome;

/// Receives progress outcomes while a tool runs.
pub type ProgressReporter = Arc<dyn Fn(ToolOutcome) + Send + Sync>;

/// Per-call context handed to [`Tool::execute`].
#[derive(Clone, Default)]
pub struct ToolContext {
    pub tool_call_id: String,
    pub tool_name: String,
    reporter: Option<ProgressReporter>,
}

impl ToolContext {
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            reporter: None,
        }
    }

    pub fn with_progress(mut self, reporter: Option<ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Publish an intermediate result. A no-op when nobody listens.
    pub fn report_progress(&self, percent: u8, content: impl Into<String>) {
        if let Some(reporter) = &self.reporter {
            reporter(ToolOutcome::progress(
                self.tool_call_id.clone(),
                self.tool_name.clone(),
                percent,
                content,
            ));
        }
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("tool_name", &self.tool_name)
            .field("reporter", &self.reporter.as_ref().map(|_| ".."))
            .finish()
    }
}

/// A capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &ToolParameters;

    /// Run the tool. A returned string is passed to the model verbatim; any
    /// other JSON value is serialized.
    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<serde_json::Value>;
}

type ToolHandler = dyn Fn(ToolArguments, ToolContext) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Closure-backed tool.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<serde_json::Value> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Render a tool's JSON result as message content.
pub(crate) fn result_to_content(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
