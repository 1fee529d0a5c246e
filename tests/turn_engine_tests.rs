//! End-to-end turns against a scripted model client.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use colloquy::engine::{TurnEngine, TurnState};
use colloquy::error::ColloquyError;
use colloquy::events::{StreamEventKind, TurnEvent, TurnEventKind};
use colloquy::prelude::ConversationState;
use colloquy::tools::{ExecutionMode, FnTool, ToolExecutionStrategy, ToolParameters};
use colloquy::types::{Role, ToolCallRecord, ToolStatus};

use common::{config, registry_with, tool_payload, weather_tool, MockClient, QueueExecutor};

fn conversation() -> ConversationState {
    let mut state = ConversationState::new("local-model").with_system("You are terse.");
    state.push_user("Weather in Paris?");
    state
}

#[tokio::test]
async fn inline_tool_turn_takes_two_model_calls() {
    for stream in [false, true] {
        let client = Arc::new(MockClient::new());
        client.queue_tool_call("call_1", "get_weather", json!({"location": "Paris"}));
        client.queue_text("It is sunny in Paris.");
        let runs = Arc::new(AtomicUsize::new(0));
        let mut engine = TurnEngine::new(
            client.clone(),
            registry_with(vec![weather_tool(runs.clone())]),
            ToolExecutionStrategy::default(),
            config(stream),
        );
        let mut state = conversation();

        let answer = engine.handle(&mut state, None).await.unwrap();

        assert_eq!(answer, "It is sunny in Paris.");
        assert_eq!(client.calls(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), TurnState::Complete);

        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let payload = tool_payload(&state.messages()[3]);
        assert_eq!(payload.tool_call_id, "call_1");
        assert_eq!(payload.content, "sunny in Paris");
        assert_eq!(payload.status, ToolStatus::Success);
    }
}

#[tokio::test]
async fn follow_up_request_carries_tool_result_and_definitions() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Oslo"}));
    client.queue_text("Cold.");
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::default(),
        config(true),
    );
    let mut state = conversation().with_option("temperature", 0.1);

    engine.handle(&mut state, None).await.unwrap();

    let requests = client.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "get_weather");
    assert_eq!(requests[0].options["temperature"], json!(0.1));
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn deferred_tool_suspends_until_completion() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Lima"}));
    client.queue_text("Sunny in Lima.");
    let executor = Arc::new(QueueExecutor::default());
    let strategy = ToolExecutionStrategy::new(ExecutionMode::Deferred).with_executor(executor.clone());
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        strategy,
        config(false),
    );
    let queued = Arc::new(Mutex::new(Vec::new()));
    let seen = queued.clone();
    engine
        .turn_events_mut()
        .on(TurnEventKind::ToolQueued, move |event| {
            if let TurnEvent::ToolQueued { call } = event {
                seen.lock().unwrap().push(call.id.clone());
            }
            Ok(())
        });
    let mut state = conversation();

    let (answer, ()) = tokio::join!(engine.handle(&mut state, None), async {
        let job = executor.next_job().await;
        // Suspended: only the first model call has happened.
        assert_eq!(client.calls(), 1);
        tokio::task::yield_now().await;
        assert_eq!(client.calls(), 1);
        assert_eq!(job.tool_call_id(), "call_1");
        job.completion.succeed(json!("sunny in Lima"));
    });

    assert_eq!(answer.unwrap(), "Sunny in Lima.");
    assert_eq!(client.calls(), 2);
    assert_eq!(*queued.lock().unwrap(), vec!["call_1".to_string()]);
    assert_eq!(tool_payload(&state.messages()[3]).content, "sunny in Lima");
}

#[tokio::test]
async fn deferred_results_are_appended_in_completion_order() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_calls(vec![
        ToolCallRecord::function("call_a", "get_weather", r#"{"location":"A"}"#),
        ToolCallRecord::function("call_b", "get_weather", r#"{"location":"B"}"#),
    ]);
    client.queue_text("done");
    let executor = Arc::new(QueueExecutor::default());
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::new(ExecutionMode::Deferred).with_executor(executor.clone()),
        config(true),
    );
    let mut state = conversation();

    let (answer, ()) = tokio::join!(engine.handle(&mut state, None), async {
        let first = executor.next_job().await;
        let second = executor.next_job().await;
        second.completion.succeed(json!("b first"));
        first.completion.succeed(json!("a second"));
    });

    assert_eq!(answer.unwrap(), "done");
    let ids: Vec<&str> = state
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["call_b", "call_a"]);
}

#[tokio::test]
async fn duplicate_call_ids_each_get_a_result() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_calls(vec![
        ToolCallRecord::function("dup", "get_weather", r#"{"location":"A"}"#),
        ToolCallRecord::function("dup", "get_weather", r#"{"location":"B"}"#),
    ]);
    client.queue_text("done");
    let executor = Arc::new(QueueExecutor::default());
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::new(ExecutionMode::Deferred).with_executor(executor.clone()),
        config(false),
    );
    let mut state = conversation();

    let (answer, ()) = tokio::join!(engine.handle(&mut state, None), async {
        let first = executor.next_job().await;
        let second = executor.next_job().await;
        first.completion.succeed(json!("weather A"));
        second.completion.succeed(json!("weather B"));
    });

    assert_eq!(answer.unwrap(), "done");
    let issued: Vec<String> = state.messages()[2]
        .tool_calls()
        .iter()
        .map(|c| c.id.clone())
        .collect();
    let answered: Vec<String> = state
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    assert_eq!(issued.len(), 2);
    assert_ne!(issued[0], issued[1]);
    assert_eq!(answered, issued);
    // The follow-up request answers every call it carries.
    assert_eq!(client.requests()[1].messages.len(), 5);
}

#[tokio::test]
async fn deferred_failure_reaches_on_error_and_history() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Rome"}));
    client.queue_text("Could not fetch the weather.");
    let executor = Arc::new(QueueExecutor::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let mut strategy = ToolExecutionStrategy::new(ExecutionMode::Deferred).with_executor(executor.clone());
    strategy.on_error(move |call, outcome| {
        sink.lock().unwrap().push((call.id.clone(), outcome.is_error()));
    });
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        strategy,
        config(false),
    );
    let mut state = conversation();

    let (answer, ()) = tokio::join!(engine.handle(&mut state, None), async {
        executor.next_job().await.completion.fail("upstream 503");
    });

    assert_eq!(answer.unwrap(), "Could not fetch the weather.");
    assert_eq!(*errors.lock().unwrap(), vec![("call_1".to_string(), true)]);
    let payload = tool_payload(&state.messages()[3]);
    assert_eq!(payload.status, ToolStatus::Error);
    assert_eq!(payload.error.as_deref(), Some("upstream 503"));
}

#[tokio::test]
async fn deferred_tool_without_executor_fails() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Rome"}));
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::default().with_mode("get_weather", ExecutionMode::Deferred),
        config(false),
    );
    let mut state = conversation();

    let err = engine.handle(&mut state, None).await.unwrap_err();

    assert!(matches!(err, ColloquyError::InvalidState(_)));
    assert_eq!(engine.state(), TurnState::Failed);
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_with_slow_model_times_out_without_tools() {
    let client = Arc::new(MockClient::slow(Duration::from_secs(30)));
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Paris"}));
    let runs = Arc::new(AtomicUsize::new(0));
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![weather_tool(runs.clone())]),
        ToolExecutionStrategy::default(),
        config(true),
    );
    let mut state = conversation();

    let err = engine
        .handle(&mut state, Some(Duration::ZERO))
        .await
        .unwrap_err();

    assert!(matches!(err, ColloquyError::TurnTimeout { .. }));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(engine.state(), TurnState::TimedOut);
    assert_eq!(state.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_model_call_is_bounded_by_turn_timeout() {
    let client = Arc::new(MockClient::slow(Duration::from_secs(30)));
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![]),
        ToolExecutionStrategy::default(),
        config(false),
    );
    let mut state = conversation();

    let err = engine
        .handle(&mut state, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();

    match err {
        ColloquyError::TurnTimeout { elapsed_ms } => assert!(elapsed_ms >= 200),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn deferred_result_after_timeout_is_dropped() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Kyiv"}));
    let executor = Arc::new(QueueExecutor::default());
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::new(ExecutionMode::Deferred).with_executor(executor.clone()),
        config(false),
    );
    let mut state = conversation();

    let err = engine
        .handle(&mut state, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ColloquyError::TurnTimeout { .. }));
    let len = state.len();

    executor.next_job().await.completion.succeed(json!("too late"));

    assert_eq!(state.len(), len);
    assert_eq!(client.calls(), 1);
    assert_eq!(engine.state(), TurnState::TimedOut);
}

#[tokio::test]
async fn failing_handler_becomes_error_tool_message() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "explode", json!({}));
    client.queue_text("The tool failed, sorry.");
    let explode = Arc::new(FnTool::new(
        "explode",
        "Always fails",
        ToolParameters::empty(),
        |_args, _ctx| async move {
            Err(ColloquyError::tool_execution("explode", "kaboom"))
        },
    ));
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![explode]),
        ToolExecutionStrategy::default(),
        config(true),
    );
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    engine.turn_events_mut().on(TurnEventKind::ToolError, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let mut state = conversation();

    let answer = engine.handle(&mut state, None).await.unwrap();

    assert_eq!(answer, "The tool failed, sorry.");
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    let payload = tool_payload(&state.messages()[3]);
    assert_eq!(payload.status, ToolStatus::Error);
    assert!(payload.content.contains("kaboom"));
}

#[tokio::test]
async fn unknown_tool_fails_the_turn() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "teleport", json!({}));
    let mut engine = TurnEngine::new(
        client.clone(),
        registry_with(vec![]),
        ToolExecutionStrategy::default(),
        config(false),
    );
    let mut state = conversation();

    let err = engine.handle(&mut state, None).await.unwrap_err();

    assert!(matches!(err, ColloquyError::UnknownTool(name) if name == "teleport"));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn missing_required_argument_fails_the_turn() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({}));
    let runs = Arc::new(AtomicUsize::new(0));
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![weather_tool(runs.clone())]),
        ToolExecutionStrategy::default(),
        config(false),
    );
    let mut state = conversation();

    let err = engine.handle(&mut state, None).await.unwrap_err();

    assert!(matches!(err, ColloquyError::InvalidArguments { .. }));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stream_events_fire_once_per_model_call() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Paris"}));
    client.queue_text("It is sunny in Paris.");
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::default(),
        config(true),
    );
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        StreamEventKind::Start,
        StreamEventKind::ToolCall,
        StreamEventKind::End,
    ] {
        let log = log.clone();
        engine.stream_events_mut().on(kind, move |_| {
            log.lock().unwrap().push(kind.to_string());
            Ok(())
        });
    }
    let mut state = conversation();

    engine.handle(&mut state, None).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "stream_start",
            "stream_tool_call",
            "stream_tool_call",
            "stream_tool_call",
            "stream_end",
            "stream_start",
            "stream_end",
        ]
    );
    // Fragmented arguments are reassembled before the tool runs.
    assert_eq!(
        state.messages()[2].tool_calls()[0].arguments,
        json!({"location": "Paris"}).to_string()
    );
}

#[tokio::test]
async fn inline_progress_is_published() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "index", json!({}));
    client.queue_text("Indexed.");
    let index = Arc::new(FnTool::new(
        "index",
        "Index the corpus",
        ToolParameters::empty(),
        |_args, ctx| async move {
            ctx.report_progress(50, "halfway");
            Ok(json!({"documents": 12}))
        },
    ));
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![index]),
        ToolExecutionStrategy::default(),
        config(false),
    );
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    engine
        .turn_events_mut()
        .on(TurnEventKind::ToolProgress, move |event| {
            if let TurnEvent::ToolProgress { outcome } = event {
                seen.lock().unwrap().push(outcome.payload().progress);
            }
            Ok(())
        });
    let mut state = conversation();

    engine.handle(&mut state, None).await.unwrap();

    assert_eq!(*progress.lock().unwrap(), vec![Some(50)]);
    assert_eq!(tool_payload(&state.messages()[3]).content, r#"{"documents":12}"#);
}

#[tokio::test]
async fn turn_event_handler_error_fails_the_turn() {
    let client = Arc::new(MockClient::new());
    client.queue_tool_call("call_1", "get_weather", json!({"location": "Paris"}));
    let mut engine = TurnEngine::new(
        client,
        registry_with(vec![weather_tool(Arc::default())]),
        ToolExecutionStrategy::default(),
        config(false),
    );
    engine
        .turn_events_mut()
        .on(TurnEventKind::ToolExecuted, |_| {
            Err(ColloquyError::Handler("audit log unavailable".into()))
        });
    let mut state = conversation();

    let err = engine.handle(&mut state, None).await.unwrap_err();

    assert!(matches!(err, ColloquyError::Handler(_)));
    assert_eq!(engine.state(), TurnState::Failed);
    // The call is still answered in history.
    let last = state.messages().last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_payload(last).status, ToolStatus::Success);
}
