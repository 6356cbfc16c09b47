//! `batch`: an ordered list of sub-tool invocations run sequentially under
//! the single permission decision already granted for the `batch` call
//! itself. Stops at the first error and returns per-step statuses.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct BatchTool {
    descriptor: ToolDescriptor,
}

impl Default for BatchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "batch".to_string(),
                name: "batch".to_string(),
                description: "Run a sequence of sub-tool calls under one permission decision.".to_string(),
                category: ToolCategory::Shell,
                requires_permission: true,
                always_require_permission: true,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "steps": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "tool_id": {"type": "string"},
                                    "args": {"type": "object"},
                                },
                                "required": ["tool_id", "args"],
                            },
                        },
                    },
                }),
                required_parameters: vec!["steps".to_string()],
            },
        }
    }
}

#[async_trait]
impl Tool for BatchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        match args.get("steps").and_then(Value::as_array) {
            Some(steps) if !steps.is_empty() => Ok(()),
            _ => Err("steps must be a non-empty array".to_string()),
        }
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let Some(registry) = ctx.registry.clone() else {
            return ToolOutcome::err("batch tool requires a registry reference".to_string());
        };
        let steps = args.get("steps").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut results = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let Some(tool_id) = step.get("tool_id").and_then(Value::as_str) else {
                results.push(json!({"step": i, "status": "err", "message": "missing tool_id"}));
                break;
            };
            let step_args = step.get("args").cloned().unwrap_or(json!({}));
            let step_use_id = format!("{}-step-{i}", ctx.execution_id);

            match registry.execute_tool_with_callbacks(tool_id, &step_use_id, step_args, ctx).await {
                Ok(outcome @ ToolOutcome::Ok { .. }) => {
                    results.push(json!({"step": i, "tool_id": tool_id, "status": "ok", "result": outcome.to_payload()}));
                }
                Ok(outcome @ ToolOutcome::Err { .. }) => {
                    results.push(json!({"step": i, "tool_id": tool_id, "status": "err", "result": outcome.to_payload()}));
                    break;
                }
                Err(e) => {
                    results.push(json!({"step": i, "tool_id": tool_id, "status": "err", "message": e.to_string()}));
                    break;
                }
            }
        }

        ToolOutcome::ok(json!({"results": results}))
    }
}
