//! `file_read`: `cat -n`-style line-numbered read, capped at 500 KiB / 1000
//! lines by the adapter regardless of caller request (P8). Records the path
//! as read in the context window on success so `file_edit`/`file_write`'s
//! read-before-write check (P2) can pass.

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub struct FileReadTool {
    descriptor: ToolDescriptor,
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FileReadTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "file_read".to_string(),
                name: "file_read".to_string(),
                description: "Read a file with line-numbered output.".to_string(),
                category: ToolCategory::FileOp,
                requires_permission: false,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "line_offset": {"type": "integer"},
                        "line_count": {"type": "integer"},
                    },
                }),
                required_parameters: vec!["path".to_string()],
            },
        }
    }
}

fn number_lines(content: &str, offset: usize) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>6}\t{}", offset + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for FileReadTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        match args.get("path").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err("path must be a non-empty string".to_string()),
        }
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
        let line_offset = args.get("line_offset").and_then(Value::as_u64).map(|n| n as usize);
        let line_count = args.get("line_count").and_then(Value::as_u64).map(|n| n as usize);

        let result = ctx
            .execution_adapter
            .read_file(&ctx.execution_id, std::path::Path::new(path), None, line_offset, line_count, None)
            .await;

        match result {
            Ok(read) => {
                if let Ok(mut window) = ctx.session.context.lock() {
                    window.record_file_read(path);
                }
                ToolOutcome::ok(json!({
                    "content": number_lines(&read.content, read.line_offset),
                    "total_lines": read.total_lines,
                    "returned_lines": read.returned_lines,
                    "truncated": read.truncated,
                }))
            }
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
    async fn reads_file_and_records_it_for_read_before_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "one\ntwo\nthree").await.expect("write");

        let tool = FileReadTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool.execute(json!({"path": path.to_string_lossy()}), &ctx).await;

        assert!(outcome.is_ok());
        assert!(ctx.session.context.lock().unwrap().has_read_file(&path.to_string_lossy()));
    }

    #[tokio::test]
    async fn caps_content_at_1000_lines_regardless_of_line_count_request(
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.txt");
        let body: String = (0..2000).map(|i| format!("line{i}\n")).collect();
        tokio::fs::write(&path, body).await.expect("write");

        let tool = FileReadTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool
            .execute(json!({"path": path.to_string_lossy(), "line_count": 5000}), &ctx)
            .await;

        let data = match outcome {
            ToolOutcome::Ok { data, .. } => data,
            ToolOutcome::Err { message, .. } => panic!("expected ok, got err: {message}"),
        };
        assert_eq!(data["returned_lines"], 1000);
        assert_eq!(data["truncated"], true);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = FileReadTool::new();
        let ctx = ctx_for(dir.path());
        let outcome = tool.execute(json!({"path": "nope.txt"}), &ctx).await;
        assert!(!outcome.is_ok());
    }
}
