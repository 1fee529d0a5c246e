//! The turn loop: model call, tool dispatch, deferred wait, repeat.

mod deadline;
pub mod runner;
pub mod state;

pub use runner::TurnEngine;
pub use state::TurnState;
