//! `grep`: regex or plain-text search over files narrowed by an optional
//! `file_pattern`. Hard-capped at [`GREP_DEFAULT_CAP`] results regardless of
//! a larger caller-supplied `max_results` (P7; spec.md §9 Open Question a —
//! kept as a named constant rather than a literal so the cap is testable
//! and, if the smaller-than-requested behavior turns out unintentional,
//! changeable in one place).

use async_trait::async_trait;
use conveyor_exec::GlobOpts;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use regex::Regex;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

pub const GREP_DEFAULT_CAP: usize = 30;

pub struct GrepTool {
    descriptor: ToolDescriptor,
}

impl Default for GrepTool {
    fn default() -> Self {
        Self::new()
    }
}

impl GrepTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "grep".to_string(),
                name: "grep".to_string(),
                description: "Search file contents by regex or plain text.".to_string(),
                category: ToolCategory::Readonly,
                requires_permission: false,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "file_pattern": {"type": "string"},
                        "root": {"type": "string"},
                        "max_results": {"type": "integer"},
                    },
                }),
                required_parameters: vec!["pattern".to_string()],
            },
        }
    }
}

#[derive(serde::Serialize)]
struct GrepMatch {
    path: String,
    line_number: usize,
    line: String,
}

#[async_trait]
impl Tool for GrepTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        let pattern = args.get("pattern").and_then(Value::as_str);
        match pattern {
            Some(s) if !s.is_empty() => {
                if Regex::new(s).is_err() && Regex::new(&regex::escape(s)).is_err() {
                    return Err("pattern is not a valid regex or literal string".to_string());
                }
                Ok(())
            }
            _ => Err("pattern must be a non-empty string".to_string()),
        }
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let pattern_str = args.get("pattern").and_then(Value::as_str).unwrap_or_default();
        let file_pattern = args.get("file_pattern").and_then(Value::as_str).unwrap_or("**/*");
        let root = args.get("root").and_then(Value::as_str).map(std::path::PathBuf::from);
        let requested_cap = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(GREP_DEFAULT_CAP);
        let cap = requested_cap.min(GREP_DEFAULT_CAP);

        let regex = match Regex::new(pattern_str) {
            Ok(r) => r,
            Err(_) => match Regex::new(&regex::escape(pattern_str)) {
                Ok(r) => r,
                Err(e) => return ToolOutcome::err(format!("invalid pattern: {e}")),
            },
        };

        let candidates = match ctx
            .execution_adapter
            .glob(
                &ctx.execution_id,
                file_pattern,
                GlobOpts {
                    root: root.clone(),
                    case_sensitive: true,
                },
            )
            .await
        {
            Ok(paths) => paths,
            Err(e) => return ToolOutcome::err(e.to_string()),
        };

        let mut matches = Vec::new();
        let mut total_matches = 0usize;
        for relative in &candidates {
            let path = root.as_ref().map(|r| r.join(relative)).unwrap_or_else(|| std::path::PathBuf::from(relative));
            let Ok(read) = ctx
                .execution_adapter
                .read_file(&ctx.execution_id, &path, None, None, None, None)
                .await
            else {
                continue;
            };
            for (idx, line) in read.content.lines().enumerate() {
                if regex.is_match(line) {
                    total_matches += 1;
                    if matches.len() < cap {
                        matches.push(GrepMatch {
                            path: relative.clone(),
                            line_number: idx + 1,
                            line: line.to_string(),
                        });
                    }
                }
            }
        }

        let truncated = total_matches > matches.len();
        ToolOutcome::ok(json!({
            "matches": matches,
            "total_matches": total_matches,
            "truncated": truncated,
        }))
    }
}
