//! Shared test helpers: a scripted model client, a queueing executor and a
//! couple of tools.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use colloquy::config::EngineConfig;
use colloquy::error::Result;
use colloquy::provider::{ChunkStream, ModelClient, ModelRequest};
use colloquy::tools::{DeferredExecutor, DeferredJob, FnTool, ToolParameters, ToolRegistry};
use colloquy::types::*;

/// A model client that replays queued responses and counts calls.
///
/// `stream` slices each queued response into chunks: content in pieces of
/// three characters, each tool call as a name fragment followed by two
/// argument fragments.
#[derive(Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<CompleteResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(CompleteResponse::text(text));
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue_tool_calls(vec![ToolCallRecord::function(id, name, args.to_string())]);
    }

    pub fn queue_tool_calls(&self, calls: Vec<ToolCallRecord>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(CompleteResponse::tool_calls(calls));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn next(&self, request: &ModelRequest) -> CompleteResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CompleteResponse::text("Mock response"))
    }
}

#[async_trait]
impl ModelClient for MockClient {
    async fn complete(&self, request: &ModelRequest) -> Result<CompleteResponse> {
        Ok(self.next(request).await)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ChunkStream> {
        let response = self.next(request).await;
        let chunks: Vec<Result<Chunk>> = to_chunks(response).into_iter().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn to_chunks(response: CompleteResponse) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let content: Vec<char> = response.content.unwrap_or_default().chars().collect();
    for piece in content.chunks(3) {
        chunks.push(Chunk::content(piece.iter().collect::<String>()));
    }
    for (index, call) in response.tool_calls.iter().enumerate() {
        let index = index as u32;
        let split = call.arguments.len() / 2;
        let (head, tail) = call.arguments.split_at(split);
        chunks.push(Chunk::tool_call(
            ToolCallFragment::new(index)
                .with_id(call.id.clone())
                .with_name(call.name.clone()),
        ));
        chunks.push(Chunk::tool_call(ToolCallFragment::new(index).with_arguments(head)));
        chunks.push(Chunk::tool_call(ToolCallFragment::new(index).with_arguments(tail)));
    }
    chunks.push(Chunk::finish(
        response.finish_reason.unwrap_or(FinishReason::Stop),
    ));
    chunks
}

/// Holds submitted jobs until the test completes them.
#[derive(Default)]
pub struct QueueExecutor {
    jobs: Mutex<VecDeque<DeferredJob>>,
    notify: Notify,
}

impl QueueExecutor {
    pub async fn next_job(&self) -> DeferredJob {
        loop {
            let job = self.jobs.lock().unwrap().pop_front();
            if let Some(job) = job {
                return job;
            }
            self.notify.notified().await;
        }
    }
}

#[async_trait]
impl DeferredExecutor for QueueExecutor {
    async fn submit(&self, job: DeferredJob) -> Result<()> {
        self.jobs.lock().unwrap().push_back(job);
        self.notify.notify_one();
        Ok(())
    }
}

pub fn config(stream: bool) -> EngineConfig {
    EngineConfig::builder()
        .model("local-model")
        .stream(stream)
        .build()
}

/// `get_weather(location)` answering "sunny in <location>", counting runs.
pub fn weather_tool(runs: Arc<AtomicUsize>) -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "get_weather",
        "Current weather for a location",
        ToolParameters::object()
            .string("location", "City name", true)
            .build(),
        move |args, _ctx| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let location = args.get_str("location")?;
                Ok(serde_json::json!(format!("sunny in {location}")))
            }
        },
    ))
}

pub fn registry_with(tools: Vec<Arc<FnTool>>) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

/// Decoded `content` of a tool message.
pub fn tool_payload(message: &Message) -> ToolResultPayload {
    serde_json::from_str(&message.content).unwrap()
}
