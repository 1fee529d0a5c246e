//! Core types for colloquy.

pub mod chunk;
pub mod message;
pub mod outcome;

pub use chunk::*;
pub use message::*;
pub use outcome::*;
