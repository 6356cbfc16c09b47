//! The tool contract (C6): every built-in tool implements [`Tool`] over a
//! shared [`ToolContext`]. Registration and lifecycle callbacks live in
//! [`crate::registry`]; this module only defines the seam.

use std::sync::Arc;

use async_trait::async_trait;
use conveyor_exec::CancelSignal;
use conveyor_exec::ExecutionAdapter;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;

use crate::registry::ToolRegistry;
use crate::session::SessionState;

/// Everything a tool's `execute` needs besides its own arguments. Carries a
/// back-reference to the registry so composite tools (`batch`, `sub_agent`)
/// can dispatch into other tools without the registry depending on them.
pub struct ToolContext {
    pub execution_id: String,
    pub execution_adapter: Arc<dyn ExecutionAdapter>,
    pub session: Arc<SessionState>,
    pub abort_signal: CancelSignal,
    pub registry: Option<Arc<ToolRegistry>>,
}

impl ToolContext {
    pub fn new(execution_id: impl Into<String>, session: Arc<SessionState>) -> Self {
        let execution_adapter = session.execution_adapter.clone();
        let abort_signal = session.abort_signal();
        Self {
            execution_id: execution_id.into(),
            execution_adapter,
            session,
            abort_signal,
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Cheap, local argument validation.
    fn validate(&self, args: &Value) -> std::result::Result<(), String>;

    /// The tool's actual behavior, assuming `args` already passed
    /// `validate`.
    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome;

    /// Validate then run. The registry calls only this method — per
    /// spec.md §4.5 it neither validates nor dispatches validation itself,
    /// so each tool owns the check by construction.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Err(reason) = self.validate(&args) {
            return ToolOutcome::err(reason);
        }
        self.run(args, ctx).await
    }
}
