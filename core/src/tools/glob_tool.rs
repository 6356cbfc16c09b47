//! `glob`: pattern-based file listing, relative to the search root.

use async_trait::async_trait;
use conveyor_exec::GlobOpts;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct GlobTool {
    descriptor: ToolDescriptor,
}

impl Default for GlobTool {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "glob".to_string(),
                name: "glob".to_string(),
                description: "List files matching a glob pattern.".to_string(),
                category: ToolCategory::Readonly,
                requires_permission: false,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "root": {"type": "string"},
                    },
                }),
                required_parameters: vec!["pattern".to_string()],
            },
        }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        match args.get("pattern").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err("pattern must be a non-empty string".to_string()),
        }
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let pattern = args.get("pattern").and_then(Value::as_str).unwrap_or_default();
        let root = args.get("root").and_then(Value::as_str).map(std::path::PathBuf::from);

        let opts = GlobOpts {
            root,
            case_sensitive: true,
        };
        match ctx.execution_adapter.glob(&ctx.execution_id, pattern, opts).await {
            Ok(paths) => ToolOutcome::ok(json!({"paths": paths})),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use conveyor_exec::HostAdapter;
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_paths_relative_to_the_search_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("a.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "").await.unwrap();

        let adapter = Arc::new(HostAdapter::single(dir.path().to_path_buf()));
        let session = Arc::new(SessionState::new("sess-1", adapter, true));
        let ctx = ToolContext::new("exec-1", session);

        let tool = GlobTool::new();
        let outcome = tool.execute(json!({"pattern": "*.rs", "root": dir.path().to_string_lossy()}), &ctx).await;

        let data = match outcome {
            ToolOutcome::Ok { data, .. } => data,
            ToolOutcome::Err { message, .. } => panic!("expected ok, got err: {message}"),
        };
        let paths: Vec<String> = data["paths"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert_eq!(paths, vec!["a.rs".to_string()]);
    }
}
