//! Drives one logical turn against a [`ModelClient`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::deadline::Deadline;
use super::state::TurnState;
use crate::config::EngineConfig;
use crate::conversation::ConversationState;
use crate::error::{ColloquyError, Result};
use crate::events::{EventBus, StreamEvent, TurnEvent};
use crate::provider::{ModelClient, ModelRequest, ToolDefinition};
use crate::stream::{AssembledResponse, ChunkProgress, StreamAggregator};
use crate::tools::deferred::{DeferredSink, Delivery};
use crate::tools::{Dispatch, ProgressReporter, ToolExecutionStrategy, ToolRegistry};
use crate::types::{Message, ToolOutcome};

/// Runs turns: call the model, execute requested tools, feed results back,
/// until the model answers in plain text.
///
/// One engine runs one turn at a time; `handle` takes `&mut self`.
///
/// ```no_run
/// use std::sync::Arc;
/// use colloquy::prelude::*;
///
/// # async fn demo() -> colloquy::error::Result<()> {
/// let config = EngineConfig::from_env()?;
/// let client = Arc::new(OpenAiCompatibleClient::new(&config)?);
/// let registry = Arc::new(ToolRegistry::new());
/// let strategy = ToolExecutionStrategy::from_config(&config);
/// let mut engine = TurnEngine::new(client, registry, strategy, config.clone());
///
/// let mut state = ConversationState::new(config.model.clone());
/// state.push_user("What is the weather in Paris?");
/// let answer = engine.handle(&mut state, None).await?;
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
pub struct TurnEngine {
    client: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    strategy: ToolExecutionStrategy,
    config: EngineConfig,
    aggregator: StreamAggregator,
    turn_events: EventBus<TurnEvent>,
    state: TurnState,
}

impl TurnEngine {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        strategy: ToolExecutionStrategy,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            strategy,
            config,
            aggregator: StreamAggregator::new(),
            turn_events: EventBus::new(),
            state: TurnState::Idle,
        }
    }

    /// State of the current or most recent turn.
    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn strategy_mut(&mut self) -> &mut ToolExecutionStrategy {
        &mut self.strategy
    }

    /// Listeners for `stream_*` events of streaming model calls.
    pub fn stream_events_mut(&mut self) -> &mut EventBus<StreamEvent> {
        self.aggregator.events_mut()
    }

    /// Listeners for `tool_*` events.
    pub fn turn_events_mut(&mut self) -> &mut EventBus<TurnEvent> {
        &mut self.turn_events
    }

    /// Run one turn on `state` and return the model's final text.
    ///
    /// `timeout` bounds the whole turn and falls back to the configured
    /// `turn_timeout`. Messages appended before a failure stay in `state`.
    pub async fn handle(
        &mut self,
        state: &mut ConversationState,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let deadline = Deadline::start(timeout.or(self.config.turn_timeout));
        self.turn_events.reset();

        let result = self.run(state, &deadline).await;
        let terminal = match &result {
            Ok(_) => TurnState::Complete,
            Err(ColloquyError::TurnTimeout { .. }) => TurnState::TimedOut,
            Err(_) => TurnState::Failed,
        };
        self.transition(terminal);
        if let Err(err) = &result {
            debug!(error = %err, category = ?err.category(), "turn ended with error");
        }
        result
    }

    async fn run(&mut self, state: &mut ConversationState, deadline: &Deadline) -> Result<String> {
        let tools = self.registry.definitions();
        // Completions minted in this turn deliver here. The receiver dies with
        // the turn, which turns late deliveries into no-ops.
        let (sink, mut deliveries) = DeferredSink::channel();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ToolOutcome>();
        let reporter: ProgressReporter = Arc::new(move |outcome: ToolOutcome| {
            let _ = progress_tx.send(outcome);
        });

        let max_iterations = self.config.max_iterations;
        for iteration in 1..=max_iterations {
            self.transition(TurnState::AwaitingModelResponse);
            deadline.check()?;
            debug!(iteration, model = %state.model(), messages = state.len(), "calling model");

            let response = self.call_model(state, tools.clone(), deadline).await?;
            if !response.has_tool_calls() {
                state.append(Message::assistant(response.content.clone()))?;
                return Ok(response.content);
            }

            self.transition(TurnState::ResolvingToolCalls);
            let calls = response.tool_calls;
            state.append(Message::assistant_with_tool_calls(
                response.content,
                calls.clone(),
            ))?;

            let mut outstanding = HashSet::new();
            for call in &calls {
                deadline.check()?;
                let dispatch = deadline
                    .bound(self.strategy.on_tool_call_requested(
                        &self.registry,
                        call,
                        &sink,
                        Some(reporter.clone()),
                    ))
                    .await??;
                while let Ok(outcome) = progress_rx.try_recv() {
                    self.turn_events.trigger(&TurnEvent::ToolProgress { outcome })?;
                }
                match dispatch {
                    Dispatch::Completed(outcome) => self.record_outcome(state, outcome)?,
                    Dispatch::Deferred => {
                        self.turn_events
                            .trigger(&TurnEvent::ToolQueued { call: call.clone() })?;
                        outstanding.insert(call.id.clone());
                    }
                }
            }

            if !outstanding.is_empty() {
                self.transition(TurnState::AwaitingDeferredResults);
                self.await_deferred(state, &mut deliveries, outstanding, deadline)
                    .await?;
            }
        }

        Err(ColloquyError::IterationLimit(max_iterations))
    }

    async fn call_model(
        &mut self,
        state: &ConversationState,
        tools: Vec<ToolDefinition>,
        deadline: &Deadline,
    ) -> Result<AssembledResponse> {
        let request = ModelRequest::from_state(state, tools);
        if !self.config.stream {
            let response = deadline.bound(self.client.complete(&request)).await??;
            return Ok(response.into());
        }

        self.aggregator.reset();
        let mut stream = deadline.bound(self.client.stream(&request)).await??;
        loop {
            match deadline.bound(stream.next()).await? {
                Some(Ok(chunk)) => {
                    if let ChunkProgress::Finished(assembled) = self.aggregator.handle_chunk(&chunk)? {
                        return Ok(assembled);
                    }
                }
                Some(Err(err)) => return Err(self.aggregator.report_error(err)),
                None => {
                    warn!("model stream ended without a finish reason");
                    return Ok(self.aggregator.finish_incomplete());
                }
            }
        }
    }

    /// Collect deferred outcomes in arrival order until none are outstanding.
    async fn await_deferred(
        &mut self,
        state: &mut ConversationState,
        deliveries: &mut mpsc::UnboundedReceiver<Delivery>,
        mut outstanding: HashSet<String>,
        deadline: &Deadline,
    ) -> Result<()> {
        while !outstanding.is_empty() {
            debug!(outstanding = outstanding.len(), "waiting for deferred results");
            let delivery = deadline.bound(deliveries.recv()).await?.ok_or_else(|| {
                ColloquyError::InvalidState("deferred delivery channel closed".into())
            })?;
            match delivery {
                Delivery::Progress(outcome) => {
                    self.turn_events.trigger(&TurnEvent::ToolProgress { outcome })?;
                }
                Delivery::Finished { call, outcome } => {
                    if !outstanding.remove(&call.id) {
                        debug!(tool_call_id = %call.id, "ignoring delivery for a call not awaited");
                        continue;
                    }
                    self.strategy.notify(&call, &outcome);
                    self.record_outcome(state, outcome)?;
                }
            }
        }
        Ok(())
    }

    fn record_outcome(&mut self, state: &mut ConversationState, outcome: ToolOutcome) -> Result<()> {
        debug!(
            tool_name = %outcome.tool_name,
            tool_call_id = %outcome.tool_call_id,
            error = outcome.is_error(),
            "tool outcome"
        );
        state.append(outcome.to_message()?)?;
        self.turn_events.trigger(&TurnEvent::from_outcome(outcome))
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "turn state");
        }
        self.state = next;
    }
}

impl fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .field("tools", &self.registry.len())
            .finish()
    }
}
