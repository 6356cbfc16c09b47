//! `file_write`: requires the target to have been `file_read` first on
//! overwrite (P2); refuses to overwrite an existing file unless
//! `overwrite=true`, and creates parent directories when `create_dir=true`.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct FileWriteTool {
    descriptor: ToolDescriptor,
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriteTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "file_write".to_string(),
                name: "file_write".to_string(),
                description: "Write (or overwrite) a file's contents.".to_string(),
                category: ToolCategory::FileOp,
                requires_permission: true,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"},
                        "overwrite": {"type": "boolean"},
                        "create_dir": {"type": "boolean"},
                    },
                }),
                required_parameters: vec!["path".to_string(), "content".to_string()],
            },
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        if args.get("path").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err("path must be a non-empty string".to_string());
        }
        if args.get("content").and_then(Value::as_str).is_none() {
            return Err("content is required".to_string());
        }
        Ok(())
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path_str = args.get("path").and_then(Value::as_str).unwrap_or_default();
        let path = std::path::Path::new(path_str);
        let content = args.get("content").and_then(Value::as_str).unwrap_or_default();
        let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);
        let create_dir = args.get("create_dir").and_then(Value::as_bool).unwrap_or(false);

        let exists = path.exists();
        if exists && !overwrite {
            return ToolOutcome::err(format!("refusing to overwrite {path_str} without overwrite=true"));
        }
        if exists {
            let has_read = ctx.session.context.lock().map(|w| w.has_read_file(path_str)).unwrap_or(false);
            if !has_read {
                return ToolOutcome::err(format!(
                    "{path_str} has not been read this session; read it before overwriting"
                ));
            }
        }

        if create_dir && let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutcome::err(format!("failed to create {}: {e}", parent.display()));
            }
        }

        match ctx.execution_adapter.write_file(&ctx.execution_id, path, content, None).await {
            Ok(()) => ToolOutcome::ok(json!({"path": path_str, "bytes_written": content.len()})),
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
    async fn writes_a_new_file_without_requiring_a_prior_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("new.txt");

        let tool = FileWriteTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool.execute(json!({"path": path.to_string_lossy(), "content": "hi"}), &ctx).await;
        assert!(outcome.is_ok());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn refuses_to_overwrite_without_overwrite_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("existing.txt");
        tokio::fs::write(&path, "old").await.unwrap();

        let tool = FileWriteTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool.execute(json!({"path": path.to_string_lossy(), "content": "new"}), &ctx).await;
        assert!(!outcome.is_ok());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "old");
    }

    #[tokio::test]
    async fn refuses_to_overwrite_an_unread_file_even_with_overwrite_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("existing.txt");
        tokio::fs::write(&path, "old").await.unwrap();

        let tool = FileWriteTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool
            .execute(json!({"path": path.to_string_lossy(), "content": "new", "overwrite": true}), &ctx)
            .await;
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn overwrites_after_read_and_flag_are_both_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("existing.txt");
        tokio::fs::write(&path, "old").await.unwrap();

        let tool = FileWriteTool::new();
        let ctx = ctx_for(dir.path());
        let path_str = path.to_string_lossy().to_string();
        ctx.session.context.lock().unwrap().record_file_read(&path_str);

        let outcome = tool.execute(json!({"path": path_str, "content": "new", "overwrite": true}), &ctx).await;
        assert!(outcome.is_ok());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn creates_parent_directories_when_requested() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deep.txt");

        let tool = FileWriteTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool
            .execute(json!({"path": path.to_string_lossy(), "content": "hi", "create_dir": true}), &ctx)
            .await;
        assert!(outcome.is_ok());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hi");
    }
}
