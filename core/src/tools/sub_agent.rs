//! `sub_agent`: wraps another agent defined by a JSON config, lazily
//! instantiates it, and forwards a `query` string. Gated by
//! `experimentalFeatures.subAgents` at the config-validation layer
//! (`conveyor_protocol::config`); this tool only needs something that can
//! actually spin up and run a nested agent, supplied by the host
//! application so this crate doesn't have to depend on its own `Agent`
//! wiring to describe the contract.

use std::sync::Arc;

use async_trait::async_trait;
use conveyor_protocol::AgentConfig;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub type SubAgentConfig = AgentConfig;

#[async_trait]
pub trait SubAgentRunner: Send + Sync {
    /// Instantiate (or reuse a cached instance of) the agent described by
    /// `config` and run `query` against it, returning its final response.
    async fn run(&self, config: &SubAgentConfig, query: &str) -> Result<String, String>;
}

pub struct SubAgentTool {
    descriptor: ToolDescriptor,
    runner: Arc<dyn SubAgentRunner>,
}

impl SubAgentTool {
    pub fn new(runner: Arc<dyn SubAgentRunner>) -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "sub_agent".to_string(),
                name: "sub_agent".to_string(),
                description: "Delegate a query to a nested agent defined by a JSON config.".to_string(),
                category: ToolCategory::Network,
                requires_permission: true,
                always_require_permission: true,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "config": {"type": "object"},
                        "query": {"type": "string"},
                    },
                }),
                required_parameters: vec!["config".to_string(), "query".to_string()],
            },
            runner,
        }
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        if args.get("config").is_none_or(|c| !c.is_object()) {
            return Err("config must be an object".to_string());
        }
        if args.get("query").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err("query must be a non-empty string".to_string());
        }
        Ok(())
    }

    async fn run(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default().to_string();
        let config: AgentConfig = match serde_json::from_value(args.get("config").cloned().unwrap_or(json!({}))) {
            Ok(c) => c,
            Err(e) => return ToolOutcome::err(format!("invalid sub-agent config: {e}")),
        };
        if let Err(e) = config.validate() {
            return ToolOutcome::err(format!("invalid sub-agent config: {e}"));
        }

        match self.runner.run(&config, &query).await {
            Ok(response) => ToolOutcome::ok(json!({"response": response})),
            Err(message) => ToolOutcome::err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use conveyor_exec::HostAdapter;
    use std::path::PathBuf;

    struct EchoRunner;

    #[async_trait]
    impl SubAgentRunner for EchoRunner {
        async fn run(&self, _config: &SubAgentConfig, query: &str) -> Result<String, String> {
            Ok(format!("nested: {query}"))
        }
    }

    fn minimal_config() -> Value {
        json!({
            "environment": {"type": "local"},
            "systemPrompt": "you are a helper",
            "experimentalFeatures": {"localEnvironment": true},
        })
    }

    fn test_ctx() -> ToolContext {
        let adapter = Arc::new(HostAdapter::single(PathBuf::from(".")));
        let session = Arc::new(SessionState::new("sess-1", adapter, true));
        ToolContext::new("exec-1", session)
    }

    #[tokio::test]
    async fn forwards_the_query_and_returns_the_nested_response() {
        let tool = SubAgentTool::new(Arc::new(EchoRunner));
        let ctx = test_ctx();

        let outcome = tool.execute(json!({"config": minimal_config(), "query": "ping"}), &ctx).await;
        match outcome {
            ToolOutcome::Ok { data, .. } => assert_eq!(data["response"], "nested: ping"),
            ToolOutcome::Err { message, .. } => panic!("expected ok, got err: {message}"),
        }
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_the_runner_is_invoked() {
        let tool = SubAgentTool::new(Arc::new(EchoRunner));
        let ctx = test_ctx();

        let outcome = tool.execute(json!({"config": {"environment": {"type": "bogus"}}, "query": "ping"}), &ctx).await;
        assert!(!outcome.is_ok());
    }
}
