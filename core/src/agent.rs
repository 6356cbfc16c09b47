//! The agent facade: wires a [`SessionState`], [`ToolRegistry`],
//! [`PermissionGate`], [`EventBus`], and [`Driver`] together behind the
//! single `process_query` entry point named in spec.md §6. Construction
//! (config validation, backend selection) is the caller's job — this type
//! only owns what a running session needs once it exists.

use std::sync::Arc;

use async_trait::async_trait;
use conveyor_exec::ExecutionAdapter;
use conveyor_protocol::AgentConfig;
use conveyor_protocol::ContentPart;

use crate::error::CoreError;
use crate::error::Result;
use crate::events::EventBus;
use crate::fsm::Driver;
use crate::fsm::RunOutcome;
use crate::model::ModelClient;
use crate::permission::PermissionGate;
use crate::registry::ToolRegistry;
use crate::session::SessionState;
use crate::tools::SubAgentConfig;
use crate::tools::SubAgentRunner;
use crate::tools::SubAgentTool;

pub struct Agent {
    pub session: Arc<SessionState>,
    pub registry: Arc<ToolRegistry>,
    pub permission_gate: Arc<PermissionGate>,
    pub event_bus: Arc<EventBus>,
    pub driver: Driver,
    pub default_model: Option<String>,
}

/// The shape `process_query` returns, matching spec.md §6 exactly (a
/// `result` breakdown is folded into `RunOutcome`'s own fields rather than
/// nested further, since every field here already corresponds 1:1 to one
/// named in the spec).
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub response: Option<String>,
    pub done: bool,
    pub aborted: bool,
    pub error: Option<String>,
    pub tool_result_count: u32,
    pub iterations: u32,
}

impl From<RunOutcome> for QueryResult {
    fn from(o: RunOutcome) -> Self {
        Self {
            response: o.response,
            done: o.done,
            aborted: o.aborted,
            error: o.error,
            tool_result_count: o.tool_result_count,
            iterations: o.iterations,
        }
    }
}

impl Agent {
    pub fn new(
        session_id: impl Into<String>,
        config: &AgentConfig,
        execution_adapter: Arc<dyn ExecutionAdapter>,
        model_client: Arc<dyn ModelClient>,
        permission_gate: Arc<PermissionGate>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let session = Arc::new(SessionState::new(
            session_id.clone(),
            execution_adapter,
            config.caching_enabled,
        ));

        let registry = Arc::new(ToolRegistry::new());
        crate::tools::register_builtin_tools(&registry)?;

        if config.experimental_features.sub_agents {
            let runner = Arc::new(NestedAgentRunner {
                execution_adapter: session.execution_adapter.clone(),
                model_client: model_client.clone(),
                permission_gate: permission_gate.clone(),
            });
            registry.register(Arc::new(SubAgentTool::new(runner)))?;
        }

        if let Some(allowed) = &config.allowed_tools {
            restrict_to_allowed(&registry, allowed)?;
        }

        let event_bus = Arc::new(EventBus::new(session_id));
        let driver = Driver::new(model_client, registry.clone(), permission_gate.clone(), event_bus.clone());

        Ok(Self {
            session,
            registry,
            permission_gate,
            event_bus,
            driver,
            default_model: config.default_model.clone(),
        })
    }

    /// §6 `processQuery(query, model, sessionState?)`. `model` falls back to
    /// the agent's configured default; missing both is a fatal configuration
    /// error.
    pub async fn process_query(&self, query: &str, model: Option<&str>) -> Result<QueryResult> {
        let model = model
            .map(str::to_string)
            .or_else(|| self.default_model.clone())
            .ok_or(CoreError::NoModelConfigured)?;

        match self.driver.run(query, &model, self.session.clone()).await {
            Ok(outcome) => Ok(outcome.into()),
            Err(e) => {
                self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingError {
                    message: e.to_string(),
                });
                Ok(QueryResult {
                    done: true,
                    error: Some(e.to_string()),
                    ..Default::default()
                })
            }
        }
    }

    pub fn request_abort(&self) {
        self.session.request_abort();
    }

    /// Renders the current context window's last assistant text, if any —
    /// a convenience used by CLIs that want to print the latest turn
    /// without re-deriving it from `process_query`'s return value.
    pub fn last_assistant_text(&self) -> Option<String> {
        let ctx = self.session.context.lock().ok()?;
        ctx.messages().iter().rev().find_map(|m| {
            m.content.iter().find_map(|p| match p {
                ContentPart::Text(t) => Some(t.clone()),
                _ => None,
            })
        })
    }
}

/// The default `sub_agent` backing: spins up a fresh [`Agent`] from the
/// nested config, sharing this session's execution adapter and model
/// client, and runs one query against it. Each call gets its own
/// short-lived agent rather than a cached pool — nested agents are
/// expected to be shallow and infrequent (spec.md §4.6 gates this behind
/// `experimentalFeatures.subAgents` for exactly that reason).
struct NestedAgentRunner {
    execution_adapter: Arc<dyn ExecutionAdapter>,
    model_client: Arc<dyn ModelClient>,
    permission_gate: Arc<PermissionGate>,
}

#[async_trait]
impl SubAgentRunner for NestedAgentRunner {
    async fn run(&self, config: &SubAgentConfig, query: &str) -> std::result::Result<String, String> {
        let nested_id = format!("sub-{}", uuid::Uuid::new_v4());
        let agent = Agent::new(
            nested_id,
            config,
            self.execution_adapter.clone(),
            self.model_client.clone(),
            self.permission_gate.clone(),
        )
        .map_err(|e| e.to_string())?;

        let result = agent.process_query(query, config.default_model.as_deref()).await.map_err(|e| e.to_string())?;
        if let Some(error) = result.error {
            return Err(error);
        }
        result.response.ok_or_else(|| "sub-agent returned no response".to_string())
    }
}

/// `allowedTools` is enforced at lookup time by the driver/registry, not by
/// mutating what's registered (the registry has no `unregister`); this just
/// fails fast on a config typo that names a tool which was never registered.
fn restrict_to_allowed(registry: &ToolRegistry, allowed: &[String]) -> Result<()> {
    for name in allowed {
        if registry.get(name).is_none() {
            return Err(CoreError::Other(format!("allowedTools entry {name:?} is not a registered tool")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use conveyor_exec::HostAdapter;

    use super::*;
    use crate::model::GenerateOptions;
    use crate::model::ModelDecision;
    use crate::permission::FixedUiHandler;

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

    #[async_trait]
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
            unreachable!("agent tests never call generate_response directly")
        }
    }

    fn minimal_config() -> AgentConfig {
        let toml = r#"
            systemPrompt = "you are a helper"
            [environment]
            type = "local"
            [experimentalFeatures]
            localEnvironment = true
        "#;
        AgentConfig::from_str(toml).expect("minimal config parses and validates")
    }

    fn test_agent(model: Arc<dyn ModelClient>, config: &AgentConfig) -> Agent {
        let adapter = Arc::new(HostAdapter::single(PathBuf::from(".")));
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(true))));
        Agent::new("sess-1", config, adapter, model, gate).expect("agent construction")
    }

    #[tokio::test]
    async fn process_query_returns_the_final_model_response() {
        let model = Arc::new(ScriptedModelClient::new(vec![ModelDecision::Final {
            response: "hello there".to_string(),
        }]));
        let agent = test_agent(model, &minimal_config());

        let result = agent.process_query("hi", Some("test-model")).await.expect("process_query");
        assert_eq!(result.response.as_deref(), Some("hello there"));
        assert!(result.done);
        assert!(!result.aborted);
        assert_eq!(agent.last_assistant_text().as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn missing_model_falls_back_to_the_configured_default() {
        let model = Arc::new(ScriptedModelClient::new(vec![ModelDecision::Final {
            response: "from default".to_string(),
        }]));
        let mut config = minimal_config();
        config.default_model = Some("configured-model".to_string());
        let agent = test_agent(model, &config);

        let result = agent.process_query("hi", None).await.expect("process_query");
        assert_eq!(result.response.as_deref(), Some("from default"));
    }

    #[tokio::test]
    async fn missing_model_without_a_default_is_a_configuration_error() {
        let model = Arc::new(ScriptedModelClient::new(vec![]));
        let agent = test_agent(model, &minimal_config());

        let result = agent.process_query("hi", None).await.expect("process_query reports the error inline");
        assert!(result.error.is_some());
        assert!(result.done);
    }

    #[tokio::test]
    async fn request_abort_is_forwarded_to_the_session() {
        let model = Arc::new(ScriptedModelClient::new(vec![]));
        let agent = test_agent(model, &minimal_config());

        assert!(!agent.session.is_aborted());
        agent.request_abort();
        assert!(agent.session.is_aborted());
    }

    #[tokio::test]
    async fn allowed_tools_naming_an_unregistered_tool_fails_construction() {
        let model = Arc::new(ScriptedModelClient::new(vec![]));
        let mut config = minimal_config();
        config.allowed_tools = Some(vec!["not_a_real_tool".to_string()]);

        let adapter = Arc::new(HostAdapter::single(PathBuf::from(".")));
        let gate = Arc::new(PermissionGate::new(Arc::new(FixedUiHandler(true))));
        let result = Agent::new("sess-1", &config, adapter, model, gate);
        assert!(result.is_err());
    }
}
