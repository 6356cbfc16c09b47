//! The tool registry (C5): register tools by id, index by category, and run
//! them with lifecycle callbacks. Grounded on the teacher's dispatch arm in
//! `codex-rs/core/src/codex.rs` and the subscriber-list shape used for MCP
//! connections in `mcp_connection_manager.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;
use crate::tool::Tool;
use crate::tool::ToolContext;

pub type StartCallback = Arc<dyn Fn(&str, &str, Instant) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(&str, &str, std::time::Duration) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    by_category: RwLock<HashMap<ToolCategory, Vec<String>>>,
    on_start: RwLock<Vec<StartCallback>>,
    on_complete: RwLock<Vec<CompleteCallback>>,
    on_error: RwLock<Vec<ErrorCallback>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let descriptor = tool.descriptor().clone();
        let mut tools = self
            .tools
            .write()
            .map_err(|_| CoreError::Other("tool registry lock poisoned".to_string()))?;
        if tools.contains_key(&descriptor.id) {
            return Err(CoreError::Other(format!("tool {} already registered", descriptor.id)));
        }
        tools.insert(descriptor.id.clone(), tool);

        let mut by_category = self
            .by_category
            .write()
            .map_err(|_| CoreError::Other("tool registry lock poisoned".to_string()))?;
        by_category
            .entry(descriptor.category)
            .or_default()
            .push(descriptor.id.clone());
        Ok(())
    }

    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().ok()?.get(tool_id).cloned()
    }

    pub fn descriptor(&self, tool_id: &str) -> Option<ToolDescriptor> {
        self.get(tool_id).map(|t| t.descriptor().clone())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .map(|tools| tools.values().map(|t| t.descriptor().clone()).collect())
            .unwrap_or_default()
    }

    pub fn by_category(&self, category: ToolCategory) -> Vec<String> {
        self.by_category
            .read()
            .ok()
            .and_then(|m| m.get(&category).cloned())
            .unwrap_or_default()
    }

    /// Append-only during startup; not safe to call concurrently with
    /// `execute_tool_with_callbacks` (spec.md §5).
    pub fn on_exec_start(&self, cb: StartCallback) {
        if let Ok(mut cbs) = self.on_start.write() {
            cbs.push(cb);
        }
    }

    pub fn on_exec_complete(&self, cb: CompleteCallback) {
        if let Ok(mut cbs) = self.on_complete.write() {
            cbs.push(cb);
        }
    }

    pub fn on_exec_error(&self, cb: ErrorCallback) {
        if let Ok(mut cbs) = self.on_error.write() {
            cbs.push(cb);
        }
    }

    /// Fires start callbacks, runs the tool, then fires complete or error
    /// callbacks. Unlike the name suggests this never raises a Rust error
    /// for a tool failure — `ToolOutcome::Err` is a normal return value the
    /// driver folds back into the conversation; only an unknown `tool_id`
    /// is an actual `CoreError`.
    pub async fn execute_tool_with_callbacks(
        &self,
        tool_id: &str,
        tool_use_id: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutcome> {
        let tool = self
            .get(tool_id)
            .ok_or_else(|| CoreError::UnknownTool(tool_id.to_string()))?;

        let start = Instant::now();
        if let Ok(cbs) = self.on_start.read() {
            for cb in cbs.iter() {
                cb(tool_id, tool_use_id, start);
            }
        }

        let outcome = tool.execute(args, ctx).await;

        match &outcome {
            ToolOutcome::Ok { .. } => {
                let duration = start.elapsed();
                if let Ok(cbs) = self.on_complete.read() {
                    for cb in cbs.iter() {
                        cb(tool_id, tool_use_id, duration);
                    }
                }
            }
            ToolOutcome::Err { message, .. } => {
                if let Ok(cbs) = self.on_error.read() {
                    for cb in cbs.iter() {
                        cb(tool_id, tool_use_id, message);
                    }
                }
            }
        }

        Ok(outcome)
    }
}
