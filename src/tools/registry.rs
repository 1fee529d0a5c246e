//! Name-keyed tool registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext};
use super::validation::validate_arguments;
use crate::error::{ColloquyError, Result};
use crate::provider::ToolDefinition;
use crate::types::ToolCallRecord;

/// Maps tool names to tools. Read-mostly; safe to share across tasks.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

/// A tool call whose tool exists and whose arguments parsed and validated.
#[derive(Clone)]
pub struct ResolvedCall {
    pub call: ToolCallRecord,
    pub tool: Arc<dyn Tool>,
    pub arguments: ToolArguments,
}

impl ResolvedCall {
    /// Invoke the tool. Every handler failure surfaces as
    /// [`ColloquyError::ToolExecution`].
    pub async fn run(&self, ctx: &ToolContext) -> Result<serde_json::Value> {
        self.tool
            .execute(&self.arguments, ctx)
            .await
            .map_err(|err| match err {
                ColloquyError::ToolExecution { .. } => err,
                other => ColloquyError::tool_execution(self.call.name.clone(), other.to_string()),
            })
    }

    pub fn context(&self) -> ToolContext {
        ToolContext::new(self.call.id.clone(), self.call.name.clone())
    }
}

impl fmt::Debug for ResolvedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCall")
            .field("call", &self.call)
            .field("arguments", &self.arguments)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its name, returning any tool it replaced.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self
            .tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), tool);
        if previous.is_some() {
            debug!(tool_name = %name, "replaced registered tool");
        }
        previous
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .read()
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Look up the tool and parse and validate the call's arguments.
    pub fn resolve(&self, call: &ToolCallRecord) -> Result<ResolvedCall> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ColloquyError::UnknownTool(call.name.clone()))?;
        let value = call.parse_arguments().map_err(|e| {
            ColloquyError::invalid_arguments(call.name.clone(), format!("arguments are not valid JSON: {e}"))
        })?;
        validate_arguments(&call.name, &value, tool.parameters())?;
        Ok(ResolvedCall {
            call: call.clone(),
            tool,
            arguments: ToolArguments::for_tool(call.name.clone(), value),
        })
    }

    /// Resolve and run `call` without progress reporting.
    pub async fn execute(&self, call: &ToolCallRecord) -> Result<serde_json::Value> {
        let resolved = self.resolve(call)?;
        resolved.run(&resolved.context()).await
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
