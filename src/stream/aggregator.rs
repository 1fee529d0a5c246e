//! Merge partial chunks into content text and index-addressed tool calls.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ColloquyError, Result};
use crate::events::{EventBus, StreamEvent, StreamEventKind};
use crate::types::{
    Chunk, CompleteResponse, FinishReason, ToolCallFragment, ToolCallRecord, FUNCTION_CALL_TYPE,
};

/// State after feeding one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkProgress {
    Pending,
    /// The chunk carried a finish reason; the aggregator has been reset.
    Finished(AssembledResponse),
}

/// Everything one model call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledResponse {
    pub content: String,
    /// Ordered by stream index.
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: Option<FinishReason>,
}

impl AssembledResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

impl From<CompleteResponse> for AssembledResponse {
    fn from(response: CompleteResponse) -> Self {
        Self {
            content: response.content.unwrap_or_default(),
            tool_calls: assign_ids(response.tool_calls),
            finish_reason: response.finish_reason,
        }
    }
}

/// Give every call a non-empty id, unique within one response, so each
/// result can be matched to exactly one call.
fn assign_ids(calls: impl IntoIterator<Item = ToolCallRecord>) -> Vec<ToolCallRecord> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .map(|mut record| {
            if record.id.is_empty() || !seen.insert(record.id.clone()) {
                if !record.id.is_empty() {
                    warn!(tool_call_id = %record.id, "duplicate tool call id; assigning a fresh one");
                }
                record.id = format!("call_{}", Uuid::new_v4().simple());
                seen.insert(record.id.clone());
            }
            record
        })
        .collect()
}

/// Consumes the chunks of a single model call, in arrival order.
///
/// Not reentrant: feed chunks from one task only.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    bus: EventBus<StreamEvent>,
    content: String,
    tool_calls: BTreeMap<u32, ToolCallRecord>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &EventBus<StreamEvent> {
        &self.bus
    }

    /// Register stream listeners here.
    pub fn events_mut(&mut self) -> &mut EventBus<StreamEvent> {
        &mut self.bus
    }

    /// In-progress records keyed by stream index. Arguments may be partial JSON.
    pub fn current_tool_calls(&self) -> &BTreeMap<u32, ToolCallRecord> {
        &self.tool_calls
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Feed one chunk. Failures are published as `stream_error` before they
    /// are returned.
    pub fn handle_chunk(&mut self, chunk: &Chunk) -> Result<ChunkProgress> {
        self.process(chunk).map_err(|err| self.report_error(err))
    }

    /// Publish `stream_error` for a failure that happened outside
    /// [`handle_chunk`](Self::handle_chunk), such as a transport error or an
    /// undecodable chunk, and hand the error back.
    pub fn report_error(&mut self, err: ColloquyError) -> ColloquyError {
        let event = StreamEvent::Error {
            category: err.category(),
            message: err.to_string(),
        };
        if let Err(listener_err) = self.bus.trigger(&event) {
            warn!(error = %listener_err, "stream_error listener failed");
        }
        err
    }

    /// Drop all accumulated state and triggered markers. Listeners stay.
    pub fn reset(&mut self) {
        self.content.clear();
        self.tool_calls.clear();
        self.bus.reset();
    }

    /// Close out a stream that ended without a finish reason. No `stream_end`
    /// is published.
    pub fn finish_incomplete(&mut self) -> AssembledResponse {
        let assembled = self.assemble(None);
        self.reset();
        assembled
    }

    fn process(&mut self, chunk: &Chunk) -> Result<ChunkProgress> {
        if !self.bus.has_triggered(StreamEventKind::Start) {
            self.bus.trigger(&StreamEvent::Start)?;
        }

        if let Some(delta) = chunk.content.as_deref().filter(|d| !d.is_empty()) {
            self.content.push_str(delta);
            self.bus.trigger(&StreamEvent::Content {
                delta: delta.to_string(),
            })?;
        }

        for fragment in &chunk.tool_calls {
            let record = self.merge_fragment(fragment)?;
            self.bus.trigger(&StreamEvent::ToolCall {
                record,
                index: fragment.index,
            })?;
        }

        let Some(finish_reason) = chunk.finish_reason else {
            return Ok(ChunkProgress::Pending);
        };
        self.bus.trigger(&StreamEvent::End { finish_reason })?;
        let assembled = self.assemble(Some(finish_reason));
        debug!(
            tool_calls = assembled.tool_calls.len(),
            content_len = assembled.content.len(),
            %finish_reason,
            "stream assembled"
        );
        self.reset();
        Ok(ChunkProgress::Finished(assembled))
    }

    fn merge_fragment(&mut self, fragment: &ToolCallFragment) -> Result<ToolCallRecord> {
        if let Some(call_type) = fragment.call_type.as_deref() {
            if call_type != FUNCTION_CALL_TYPE {
                return Err(ColloquyError::MalformedChunk(format!(
                    "tool call {} has unsupported type '{call_type}'",
                    fragment.index
                )));
            }
        }

        let name = fragment.function.name.as_deref().unwrap_or_default();
        let arguments = fragment.function.arguments.as_deref().unwrap_or_default();

        let record = self
            .tool_calls
            .entry(fragment.index)
            .and_modify(|record| {
                record.name.push_str(name);
                record.arguments.push_str(arguments);
                if record.id.is_empty() {
                    if let Some(id) = &fragment.id {
                        record.id = id.clone();
                    }
                }
            })
            .or_insert_with(|| {
                ToolCallRecord::function(fragment.id.clone().unwrap_or_default(), name, arguments)
            });
        Ok(record.clone())
    }

    fn assemble(&mut self, finish_reason: Option<FinishReason>) -> AssembledResponse {
        let tool_calls = assign_ids(std::mem::take(&mut self.tool_calls).into_values());
        AssembledResponse {
            content: std::mem::take(&mut self.content),
            tool_calls,
            finish_reason,
        }
    }
}
