//! Chat completions client for OpenAI-compatible local servers.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{ColloquyError, Result};
use crate::types::{
    Chunk, CompleteResponse, FinishReason, ToolCallFragment, ToolCallRecord, FUNCTION_CALL_TYPE,
};
use crate::util::retry::RetryPolicy;

use super::format::message_to_wire;
use super::http::{json_headers, parse_sse_line, status_to_error, SseLine};
use super::{ChunkStream, ModelClient, ModelRequest};

/// Client for any server speaking the `/chat/completions` protocol
/// (LM Studio, llama.cpp, vLLM, Ollama's compatibility layer).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: config.retry.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert(
            "messages".into(),
            Value::Array(request.messages.iter().map(message_to_wire).collect()),
        );
        for (key, value) in &request.options {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        body.insert("stream".into(), json!(stream));
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": FUNCTION_CALL_TYPE,
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        Value::Object(body)
    }

    /// POST the body, retrying the opening request per the retry policy.
    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint();
        let url = url.as_str();
        self.retry
            .execute(move || async move {
                let resp = self
                    .http
                    .post(url)
                    .headers(json_headers(self.api_key.as_deref()))
                    .json(body)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(status_to_error(status.as_u16(), &text));
                }
                Ok(resp)
            })
            .await
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &ModelRequest) -> Result<CompleteResponse> {
        let body = self.build_request_body(request, false);
        debug!(model = %request.model, messages = request.messages.len(), "chat completion");

        let resp = self.send(&body).await?;
        let text = resp.text().await?;
        let parsed: WireResponse = serde_json::from_str(&text)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ColloquyError::api(200, "response contained no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_record)
            .collect();

        Ok(CompleteResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ChunkStream> {
        let body = self.build_request_body(request, true);
        debug!(model = %request.model, messages = request.messages.len(), "streaming chat completion");

        let resp = self.send(&body).await?;
        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut ended = false;
            futures::pin_mut!(byte_stream);

            'read: while let Some(bytes) = byte_stream.next().await {
                let bytes = match bytes {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(ColloquyError::Transport(e));
                        ended = true;
                        break;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    match read_frame(&String::from_utf8_lossy(&raw)) {
                        Frame::Skip => {}
                        Frame::Chunk(chunk) => yield Ok(chunk),
                        Frame::Done => {
                            ended = true;
                            break 'read;
                        }
                        Frame::Failed(e) => {
                            yield Err(e);
                            ended = true;
                            break 'read;
                        }
                    }
                }
            }

            // A server may close the body without terminating the last frame.
            if !ended && !buffer.is_empty() {
                match read_frame(&String::from_utf8_lossy(&buffer)) {
                    Frame::Chunk(chunk) => yield Ok(chunk),
                    Frame::Failed(e) => yield Err(e),
                    Frame::Skip | Frame::Done => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

enum Frame {
    Chunk(Chunk),
    Skip,
    Done,
    Failed(ColloquyError),
}

/// Interpret one SSE line.
fn read_frame(line: &str) -> Frame {
    match parse_sse_line(line) {
        SseLine::Ignore => Frame::Skip,
        SseLine::Done => Frame::Done,
        SseLine::Data(data) => match decode_stream_chunk(data) {
            Ok(Some(chunk)) => Frame::Chunk(chunk),
            Ok(None) => Frame::Skip,
            Err(e) => {
                warn!(error = %e, "malformed stream chunk");
                Frame::Failed(e)
            }
        },
    }
}

/// Decode one SSE data payload. Usage-only frames with no choices yield `None`.
fn decode_stream_chunk(data: &str) -> Result<Option<Chunk>> {
    let parsed: WireStreamChunk =
        serde_json::from_str(data).map_err(|e| ColloquyError::MalformedChunk(format!("{e}: {data}")))?;
    let Some(choice) = parsed.choices.into_iter().next() else {
        return Ok(None);
    };
    Ok(Some(Chunk {
        content: choice.delta.content,
        tool_calls: choice.delta.tool_calls.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    }))
}

#[derive(Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl WireToolCall {
    fn into_record(self) -> ToolCallRecord {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        ToolCallRecord::function(id, self.function.name, self.function.arguments)
    }
}
