//! Tools: the capability trait, registry, and execution strategies.

pub mod arguments;
pub mod deferred;
pub mod registry;
pub mod strategy;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use deferred::{DeferredCompletion, DeferredExecutor, DeferredJob, DeferredSink, Delivery, SpawnExecutor};
pub use registry::{ResolvedCall, ToolRegistry};
pub use strategy::{Dispatch, ExecutionMode, OutcomeCallback, ToolExecutionStrategy};
pub use tool::{FnTool, ProgressReporter, Tool, ToolContext};
pub use types::{ParameterBuilder, ToolParameters};
pub use validation::validate_arguments;
