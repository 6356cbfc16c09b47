//! `think`: a no-op, side-effect-free scratchpad. Returns the given text
//! verbatim; exists to encourage model deliberation, not to do anything.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct ThinkTool {
    descriptor: ToolDescriptor,
}

impl Default for ThinkTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "think".to_string(),
                name: "think".to_string(),
                description: "Record a scratchpad thought; has no side effects.".to_string(),
                category: ToolCategory::Readonly,
                requires_permission: false,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {"thought": {"type": "string"}},
                }),
                required_parameters: vec!["thought".to_string()],
            },
        }
    }
}

#[async_trait]
impl Tool for ThinkTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        if args.get("thought").and_then(Value::as_str).is_none() {
            return Err("thought is required".to_string());
        }
        Ok(())
    }

    async fn run(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
        let thought = args.get("thought").and_then(Value::as_str).unwrap_or_default();
        ToolOutcome::ok(json!({"thought": thought}))
    }
}
