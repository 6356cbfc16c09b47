//! `ls`: directory listing with an optional hidden/detailed view, behind a
//! 5-second time-aware cache per `(path, hidden, details)` (spec.md §4.6).
//! Default entry limit of 100 is enforced by the adapter itself.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use conveyor_exec::LsResult;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use conveyor_protocol::ToolOutcome;
use serde_json::Value;
use serde_json::json;

use crate::tool::Tool;
use crate::tool::ToolContext;

const CACHE_TTL: Duration = Duration::from_secs(5);

type CacheKey = (String, bool, bool);

pub struct LsTool {
    descriptor: ToolDescriptor,
    cache: Mutex<HashMap<CacheKey, (Instant, LsResult)>>,
}

impl Default for LsTool {
    fn default() -> Self {
        Self::new()
    }
}

impl LsTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: "ls".to_string(),
                name: "ls".to_string(),
                description: "List a directory's entries.".to_string(),
                category: ToolCategory::Readonly,
                requires_permission: false,
                always_require_permission: false,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "show_hidden": {"type": "boolean"},
                        "details": {"type": "boolean"},
                    },
                }),
                required_parameters: vec!["path".to_string()],
            },
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<LsResult> {
        let cache = self.cache.lock().ok()?;
        let (stamped_at, result) = cache.get(key)?;
        if stamped_at.elapsed() < CACHE_TTL {
            Some(result.clone())
        } else {
            None
        }
    }

    fn store(&self, key: CacheKey, result: LsResult) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, (Instant::now(), result));
        }
    }
}

#[async_trait]
impl Tool for LsTool {
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
        let show_hidden = args.get("show_hidden").and_then(Value::as_bool).unwrap_or(false);
        let details = args.get("details").and_then(Value::as_bool).unwrap_or(false);

        let key = (path.to_string(), show_hidden, details);
        if let Some(cached) = self.cached(&key) {
            return ToolOutcome::ok(json!({"entries": cached.entries, "truncated": cached.truncated, "cached": true}));
        }

        match ctx
            .execution_adapter
            .ls(&ctx.execution_id, std::path::Path::new(path), show_hidden, details)
            .await
        {
            Ok(result) => {
                self.store(key, result.clone());
                ToolOutcome::ok(json!({"entries": result.entries, "truncated": result.truncated, "cached": false}))
            }
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}
