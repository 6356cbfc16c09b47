//! `bash`: runs a shell command through the session's execution adapter.
//! Always asks for permission (spec.md §4.6); truncates stdout/stderr at
//! 100 KiB each rather than the adapter's own (much larger) defaults.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

const MAX_OUTPUT_BYTES: usize = 100 * 1024;

pub struct BashTool {
    descriptor: ToolDescriptor,
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "bash".to_string(),
                name: "bash".to_string(),
                description: "Execute a shell command and return its stdout/stderr/exit code.".to_string(),
                category: ToolCategory::Shell,
                requires_permission: true,
                always_require_permission: true,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "The shell command to run"},
                        "working_dir": {"type": "string"},
                        "timeout_ms": {"type": "integer"},
                    },
                }),
                required_parameters: vec!["command".to_string()],
            },
        }
    }
}

fn truncate(mut s: String) -> String {
    if s.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n...[truncated]");
    }
    s
}

#[async_trait]
impl Tool for BashTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        match args.get("command").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("command must be a non-empty string".to_string()),
        }
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
        let working_dir = args.get("working_dir").and_then(Value::as_str).map(std::path::PathBuf::from);
        let timeout_ms = args.get("timeout_ms").and_then(Value::as_u64);

        let shell_command = vec!["bash".to_string(), "-lc".to_string(), command.to_string()];

        match ctx
            .execution_adapter
            .execute_command(
                &ctx.execution_id,
                &shell_command,
                working_dir.as_deref(),
                timeout_ms,
                ctx.abort_signal.clone(),
            )
            .await
        {
            Ok(output) => ToolOutcome::ok(json!({
                "stdout": truncate(output.stdout),
                "stderr": truncate(output.stderr),
                "exit_code": output.exit_code,
            })),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}
