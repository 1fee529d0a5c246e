//! Reassembly of streamed model responses.

pub mod aggregator;

pub use aggregator::{AssembledResponse, ChunkProgress, StreamAggregator};
