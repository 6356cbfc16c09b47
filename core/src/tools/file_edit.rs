//! `file_edit`: requires the target to have been `file_read` first (P2),
//! then asks the adapter to replace `search_code` — which must match
//! exactly once after normalized line endings — with `replace_code`. An
//! empty `replace_code` deletes the matched text.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct FileEditTool {
    descriptor: ToolDescriptor,
}

impl Default for FileEditTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FileEditTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "file_edit".to_string(),
                name: "file_edit".to_string(),
                description: "Replace an exact, unique snippet of a file's contents.".to_string(),
                category: ToolCategory::FileOp,
                requires_permission: true,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "search_code": {"type": "string"},
                        "replace_code": {"type": "string"},
                    },
                }),
                required_parameters: vec!["path".to_string(), "search_code".to_string()],
            },
        }
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        if args.get("path").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err("path must be a non-empty string".to_string());
        }
        if args.get("search_code").and_then(Value::as_str).is_none() {
            return Err("search_code is required".to_string());
        }
        Ok(())
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
        let search_code = args.get("search_code").and_then(Value::as_str).unwrap_or_default();
        let replace_code = args.get("replace_code").and_then(Value::as_str).unwrap_or("");

        let has_read = ctx.session.context.lock().map(|w| w.has_read_file(path)).unwrap_or(false);
        if !has_read {
            return ToolOutcome::err(format!("{path} has not been read this session; read it before editing"));
        }

        match ctx
            .execution_adapter
            .edit_file(&ctx.execution_id, std::path::Path::new(path), search_code, replace_code, None)
            .await
        {
            Ok(edit) => ToolOutcome::ok(json!({
                "path": edit.path,
                "bytes_written": edit.bytes_written,
                "deleted": edit.deleted,
            })),
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

    fn ctx_for(dir: &std::path::Path) -> ToolContext {
        let adapter = Arc::new(HostAdapter::single(dir.to_path_buf()));
        let session = Arc::new(SessionState::new("sess-1", adapter, true));
        ToolContext::new("exec-1", session)
    }

    #[tokio::test]
    async fn rejects_edit_before_the_file_has_been_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "hello world").await.expect("write");

        let tool = FileEditTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool
            .execute(json!({"path": path.to_string_lossy(), "search_code": "hello", "replace_code": "bye"}), &ctx)
            .await;
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn edits_once_the_file_has_been_marked_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "hello world").await.expect("write");

        let tool = FileEditTool::new();
        let ctx = ctx_for(dir.path());
        let path_str = path.to_string_lossy().to_string();
        ctx.session.context.lock().unwrap().record_file_read(&path_str);

        let outcome = tool.execute(json!({"path": path_str, "search_code": "hello", "replace_code": "bye"}), &ctx).await;
        assert!(outcome.is_ok());

        let content = tokio::fs::read_to_string(&path).await.expect("read");
        assert_eq!(content, "bye world");
    }

    #[tokio::test]
    async fn ambiguous_search_code_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "foo foo").await.expect("write");

        let tool = FileEditTool::new();
        let ctx = ctx_for(dir.path());
        let path_str = path.to_string_lossy().to_string();
        ctx.session.context.lock().unwrap().record_file_read(&path_str);

        let outcome = tool.execute(json!({"path": path_str, "search_code": "foo", "replace_code": "bar"}), &ctx).await;
        assert!(!outcome.is_ok());
    }
}
