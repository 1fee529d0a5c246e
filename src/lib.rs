//! Colloquy: a conversation turn engine for OpenAI-compatible model servers.
//!
//! A [`TurnEngine`](engine::TurnEngine) sends a [`ConversationState`](conversation::ConversationState)
//! to the model, reassembles streamed tool calls, runs the requested tools
//! inline or through a deferred executor, and loops until the model answers
//! in plain text.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::prelude::*;
//!
//! # async fn example() -> colloquy::error::Result<()> {
//! let config = EngineConfig::builder()
//!     .model("qwen2.5-7b-instruct")
//!     .build();
//! let client = Arc::new(OpenAiCompatibleClient::new(&config)?);
//! let registry = Arc::new(ToolRegistry::new());
//! let mut engine = TurnEngine::new(client, registry, ToolExecutionStrategy::default(), config);
//!
//! let mut state = ConversationState::new("qwen2.5-7b-instruct");
//! state.push_user("Hello!");
//! println!("{}", engine.handle(&mut state, None).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod events;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;
