//! The FSM driver (C9): a pure tagged-union state machine plus the effectful
//! loop that drives it. Grounded on the overall turn-alternation shape of
//! `codex-rs/core/src/codex.rs`'s submission loop, reworked into the
//! explicit state machine spec.md §4.9 mandates — the teacher's loop is not
//! itself a pure FSM, so this is "keep HOW, replace WHAT": same alternation
//! of model and tool turns, expressed as an exhaustively-matched state.

use std::sync::Arc;

use conveyor_protocol::ContentPart;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::error::CoreError;
use crate::error::Result;
use crate::events::EventBus;
use crate::model::GenerateOptions;
use crate::model::ModelClient;
use crate::model::ModelDecision;
use crate::permission::PermissionGate;
use crate::registry::ToolRegistry;
use crate::session::SessionState;
use crate::tool::ToolContext;

const DEFAULT_MAX_ITERATIONS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    WaitingForModel,
    WaitingForToolResult(String),
    WaitingForModelFinal,
    Complete,
    Aborted,
}

#[derive(Debug, Clone)]
pub enum DriverEvent {
    UserMessage,
    ModelToolCall(String),
    ModelFinal,
    ToolFinished,
    AbortRequested,
}

/// The pure transition table of spec.md §4.9. Any `(state, event)` pair not
/// listed here is an internal error (an "Invariant" per the §7 taxonomy),
/// not a recoverable condition.
pub fn transition(state: &DriverState, event: &DriverEvent) -> Result<DriverState> {
    use DriverEvent::*;
    use DriverState::*;

    if matches!(event, AbortRequested) && !matches!(state, Complete | Aborted) {
        return Ok(Aborted);
    }

    let next = match (state, event) {
        (Idle, UserMessage) => WaitingForModel,
        (WaitingForModel, ModelToolCall(id)) => WaitingForToolResult(id.clone()),
        (WaitingForModel, ModelFinal) => Complete,
        (WaitingForToolResult(_), ToolFinished) => WaitingForModelFinal,
        (WaitingForModelFinal, ModelToolCall(id)) => WaitingForToolResult(id.clone()),
        (WaitingForModelFinal, ModelFinal) => Complete,
        _ => {
            return Err(CoreError::Invariant(format!(
                "unspecified FSM transition: state={state:?} event={event:?}"
            )));
        }
    };
    Ok(next)
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub response: Option<String>,
    pub done: bool,
    pub aborted: bool,
    pub error: Option<String>,
    pub tool_result_count: u32,
    pub iterations: u32,
}

pub struct Driver {
    pub model_client: Arc<dyn ModelClient>,
    pub registry: Arc<ToolRegistry>,
    pub permission_gate: Arc<PermissionGate>,
    pub event_bus: Arc<EventBus>,
    pub max_iterations: u32,
}

impl Driver {
    pub fn new(
        model_client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        permission_gate: Arc<PermissionGate>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            model_client,
            registry,
            permission_gate,
            event_bus,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Runs one `processQuery` per spec.md §6. Appends `query` as a user
    /// message unless the context already ends in one, then alternates
    /// model and tool turns until a final answer or abort.
    pub async fn run(&self, query: &str, model: &str, session: Arc<SessionState>) -> Result<RunOutcome> {
        self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingStarted);

        {
            let mut ctx = session
                .context
                .lock()
                .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
            let last_is_user_text = matches!(
                ctx.peek(),
                Some(m) if m.role == conveyor_protocol::Role::User && m.content.first().is_some_and(|p| matches!(p, ContentPart::Text(_)))
            );
            if !last_is_user_text {
                ctx.push_user(query)?;
            }
            ctx.assert_starts_with_user()?;
        }

        let mut state = DriverState::Idle;
        state = transition(&state, &DriverEvent::UserMessage)?;
        let mut tool_result_count = 0u32;

        loop {
            if let Some(outcome) = self.check_abort(&session, &mut tool_result_count).await? {
                return Ok(outcome);
            }

            let iteration = session.iteration.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if iteration > self.max_iterations {
                let message = format!("exceeded maximum iterations ({})", self.max_iterations);
                self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingError {
                    message: message.clone(),
                });
                return Ok(RunOutcome {
                    error: Some(message),
                    done: true,
                    tool_result_count,
                    iterations: iteration,
                    ..Default::default()
                });
            }

            let descriptors = self.registry.descriptors();
            let decision = self.model_client.get_tool_call(query, model, &descriptors, &session).await?;

            if let Some(outcome) = self.check_abort(&session, &mut tool_result_count).await? {
                return Ok(outcome);
            }

            match decision {
                ModelDecision::ToolCall {
                    tool_id,
                    tool_use_id,
                    args,
                } => {
                    state = transition(&state, &DriverEvent::ModelToolCall(tool_use_id.clone()))?;

                    {
                        let mut ctx = session
                            .context
                            .lock()
                            .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
                        ctx.push_tool_use(tool_use_id.clone(), tool_id.clone(), args.clone())?;
                    }

                    let descriptor = self.registry.descriptor(&tool_id);
                    let args_value = Value::Object(args);
                    let granted = self
                        .permission_gate
                        .request_permission(descriptor.as_ref(), &tool_id, &args_value)
                        .await;

                    let outcome = if !granted {
                        conveyor_protocol::ToolOutcome::err("permission denied")
                    } else {
                        self.event_bus.emit(conveyor_protocol::EventMsg::ToolExecutionStarted {
                            tool_use_id: tool_use_id.clone(),
                            tool_id: tool_id.clone(),
                        });

                        let exec_ctx = ToolContext::new(tool_use_id.clone(), session.clone())
                            .with_registry(self.registry.clone());
                        match self
                            .registry
                            .execute_tool_with_callbacks(&tool_id, &tool_use_id, args_value, &exec_ctx)
                            .await
                        {
                            Ok(outcome) => {
                                match &outcome {
                                    conveyor_protocol::ToolOutcome::Err { message, .. } if !outcome.is_aborted() => {
                                        session.record_tool_error(message.clone());
                                    }
                                    _ => {}
                                }
                                outcome
                            }
                            Err(e) => {
                                warn!(tool_id, error = %e, "tool execution failed to dispatch");
                                conveyor_protocol::ToolOutcome::err(e.to_string())
                            }
                        }
                    };

                    {
                        let mut ctx = session
                            .context
                            .lock()
                            .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
                        ctx.push_tool_result(tool_use_id.clone(), outcome.to_payload())?;
                    }
                    tool_result_count += 1;

                    state = transition(&state, &DriverEvent::ToolFinished)?;

                    if let Some(result) = self.check_abort(&session, &mut tool_result_count).await? {
                        return Ok(result);
                    }
                }
                ModelDecision::Final { response } => {
                    state = transition(&state, &DriverEvent::ModelFinal)?;
                    debug!(?state, "fsm: final answer");

                    {
                        let mut ctx = session
                            .context
                            .lock()
                            .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
                        ctx.push_assistant_blocks(vec![ContentPart::Text(response.clone())])?;
                    }

                    self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingCompleted {
                        response: response.clone(),
                    });

                    return Ok(RunOutcome {
                        response: Some(response),
                        done: true,
                        tool_result_count,
                        iterations: iteration,
                        ..Default::default()
                    });
                }
            }
        }
    }

    /// Checks `session.is_aborted()` at a suspension point. On abort:
    /// synthesizes a `toolResult` for any dangling `toolUse` to preserve
    /// I-1, appends an acknowledgement unless `skip_abort_ack`, and clears
    /// the session's aborted flag so a subsequent query can proceed.
    async fn check_abort(&self, session: &Arc<SessionState>, tool_result_count: &mut u32) -> Result<Option<RunOutcome>> {
        if !session.is_aborted() {
            return Ok(None);
        }

        let mut ctx = session
            .context
            .lock()
            .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;

        if let Some(dangling) = ctx.dangling_tool_use_id().map(str::to_string) {
            ctx.push_tool_result(dangling, conveyor_protocol::ToolOutcome::aborted().to_payload())?;
            *tool_result_count += 1;
        }

        if !session.skip_abort_ack.load(std::sync::atomic::Ordering::SeqCst) {
            ctx.push_assistant_blocks(vec![ContentPart::Text("Stopped.".to_string())])?;
        }
        drop(ctx);

        self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingAborted);
        session.clear_aborted();

        Ok(Some(RunOutcome {
            aborted: true,
            done: true,
            tool_result_count: *tool_result_count,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::FixedUiHandler;
    use crate::permission::PermissionGate;
    use crate::tools::GrepTool;
    use conveyor_exec::HostAdapter;
    use serde_json::Map;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    /// A `ModelClient` double driven by a fixed script of decisions, one per
    /// call to `get_tool_call`. Scenarios S1-S4 in spec.md §8 only ever need
    /// `get_tool_call`; `generate_response` is unused by the driver.
    struct ScriptedModelClient {
        script: StdMutex<Vec<ModelDecision>>,
        calls: AtomicUsize,
    }

    impl ScriptedModelClient {
        fn new(script: Vec<ModelDecision>) -> Self {
            Self {
                script: StdMutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for ScriptedModelClient {
        async fn get_tool_call(
            &self,
            _query: &str,
            _model: &str,
            _tool_descriptions: &[conveyor_protocol::ToolDescriptor],
            _session: &SessionState,
        ) -> Result<ModelDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(ModelDecision::Final {
                    response: "done".to_string(),
                });
            }
            Ok(script.remove(0))
        }

        async fn generate_response(
            &self,
            _query: &str,
            _model: &str,
            _tool_descriptions: &[conveyor_protocol::ToolDescriptor],
            _session: &SessionState,
            _options: GenerateOptions,
        ) -> Result<conveyor_protocol::Message> {
            unreachable!("driver never calls generate_response directly")
        }
    }

    fn test_session() -> Arc<SessionState> {
        let adapter = Arc::new(HostAdapter::single(PathBuf::from(".")));
        Arc::new(SessionState::new("sess-1", adapter, true))
    }

    /// S1: no tool call, model returns a final answer immediately.
    #[tokio::test]
    async fn s1_plain_final_answer() {
        let model = Arc::new(ScriptedModelClient::new(vec![ModelDecision::Final {
            response: "hello".to_string(),
        }]));
        let registry = Arc::new(ToolRegistry::new());
        crate::tools::register_builtin_tools(&registry).expect("register tools");
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(true))));
        let bus = Arc::new(EventBus::new("sess-1"));
        let driver = Driver::new(model, registry, gate, bus);
        let session = test_session();

        let outcome = driver.run("hi", "test-model", session.clone()).await.expect("run");
        assert_eq!(outcome.response.as_deref(), Some("hello"));
        assert!(outcome.done);
        assert!(!outcome.aborted);

        let ctx = session.context.lock().unwrap();
        assert_eq!(ctx.messages().len(), 2);
        assert_eq!(ctx.messages()[0].role, conveyor_protocol::Role::User);
        assert_eq!(ctx.messages()[1].role, conveyor_protocol::Role::Assistant);
    }

    /// S2: one tool call (grep, no matches) then a final answer; I-1 holds
    /// throughout the resulting context.
    #[tokio::test]
    async fn s2_tool_call_then_final() {
        let mut args = Map::new();
        args.insert("pattern".to_string(), serde_json::Value::String("foo".to_string()));
        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelDecision::ToolCall {
                tool_id: "grep".to_string(),
                tool_use_id: "tu-1".to_string(),
                args,
            },
            ModelDecision::Final {
                response: "found".to_string(),
            },
        ]));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(GrepTool::new())).expect("register grep");
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(true))));
        let bus = Arc::new(EventBus::new("sess-1"));
        let driver = Driver::new(model, registry, gate, bus);
        let session = test_session();

        let outcome = driver.run("hi", "test-model", session.clone()).await.expect("run");
        assert_eq!(outcome.response.as_deref(), Some("found"));
        assert_eq!(outcome.tool_result_count, 1);

        let ctx = session.context.lock().unwrap();
        let messages = ctx.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[1].starts_with_tool_use());
        assert!(messages[2].is_matching_tool_result("tu-1"));
    }

    /// S3: permission denied synthesizes a `toolResult{error}` and the
    /// driver loops rather than terminating; iteration count is 2.
    #[tokio::test]
    async fn s3_denied_permission_loops_then_final() {
        let mut args = Map::new();
        args.insert("command".to_string(), serde_json::Value::String("echo hi".to_string()));
        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelDecision::ToolCall {
                tool_id: "bash".to_string(),
                tool_use_id: "tu-1".to_string(),
                args,
            },
            ModelDecision::Final {
                response: "ok".to_string(),
            },
        ]));
        let registry = Arc::new(ToolRegistry::new());
        crate::tools::register_builtin_tools(&registry).expect("register tools");
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(false))));
        let bus = Arc::new(EventBus::new("sess-1"));
        let driver = Driver::new(model, registry, gate, bus);
        let session = test_session();

        let outcome = driver.run("hi", "test-model", session.clone()).await.expect("run");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.response.as_deref(), Some("ok"));

        let ctx = session.context.lock().unwrap();
        let result_payload = ctx.messages()[2].content.first().cloned().unwrap();
        match result_payload {
            ContentPart::ToolResult { payload, .. } => {
                assert_eq!(payload["status"], "err");
                assert_eq!(payload["message"], "permission denied");
            }
            other => panic!("expected toolResult, got {other:?}"),
        }
    }

    /// S4: abort requested while a tool is "in flight" (modeled here by
    /// setting the abort flag before the driver's pre-dispatch check point,
    /// since this test double's tool call resolves synchronously). The
    /// driver must synthesize an `aborted:true` toolResult and skip the
    /// acknowledgement when `skip_abort_ack` is set.
    #[tokio::test]
    async fn s4_abort_marks_dangling_tool_use_aborted() {
        let session = test_session();
        {
            let mut ctx = session.context.lock().unwrap();
            ctx.push_user("hi").unwrap();
            ctx.push_tool_use("tu-1", "bash", Map::new()).unwrap();
        }
        session.skip_abort_ack.store(true, Ordering::SeqCst);
        session.request_abort();

        let model = Arc::new(ScriptedModelClient::new(vec![]));
        let registry = Arc::new(ToolRegistry::new());
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(true))));
        let bus = Arc::new(EventBus::new("sess-1"));
        let driver = Driver::new(model, registry, gate, bus);

        let outcome = driver.run("hi", "test-model", session.clone()).await.expect("run");
        assert!(outcome.aborted);
        assert!(outcome.done);

        let ctx = session.context.lock().unwrap();
        let messages = ctx.messages();
        assert_eq!(messages.len(), 2, "no acknowledgement message when skip_abort_ack is set");
        match &messages[1].content[0] {
            ContentPart::ToolResult { payload, .. } => assert_eq!(payload["aborted"], true),
            other => panic!("expected toolResult, got {other:?}"),
        }
        assert!(!session.is_aborted(), "abort flag cleared on return");
    }

    #[test]
    fn table_matches_spec() {
        use DriverEvent::*;
        use DriverState::*;

        assert_eq!(transition(&Idle, &UserMessage).expect("idle->waiting"), WaitingForModel);
        assert_eq!(
            transition(&WaitingForModel, &ModelToolCall("tu-1".to_string())).expect("tool call"),
            WaitingForToolResult("tu-1".to_string())
        );
        assert_eq!(transition(&WaitingForModel, &ModelFinal).expect("final"), Complete);
        assert_eq!(
            transition(&WaitingForToolResult("tu-1".to_string()), &ToolFinished).expect("finished"),
            WaitingForModelFinal
        );
        assert_eq!(
            transition(&WaitingForModelFinal, &ModelToolCall("tu-2".to_string())).expect("loop"),
            WaitingForToolResult("tu-2".to_string())
        );
        assert_eq!(transition(&WaitingForModelFinal, &ModelFinal).expect("final2"), Complete);
    }

    #[test]
    fn abort_reachable_from_any_nonterminal_state() {
        use DriverEvent::AbortRequested;
        use DriverState::*;

        for state in [Idle, WaitingForModel, WaitingForToolResult("x".to_string()), WaitingForModelFinal] {
            assert_eq!(transition(&state, &AbortRequested).expect("abort"), Aborted);
        }
    }

    #[test]
    fn unspecified_pair_is_an_error() {
        use DriverEvent::*;
        use DriverState::*;
        assert!(transition(&Idle, &ModelFinal).is_err());
    }
}
