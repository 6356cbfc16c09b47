//! The `Remote` execution adapter: every primitive is shipped as an RPC call
//! to a remote sandbox service. Bring-up of that service (provisioning,
//! auth) is out of scope here; this adapter only needs a base URL and a way
//! to resolve this session's remote sandbox id.
//!
//! Per the external interface contract, the id resolver is either supplied
//! by the caller or falls back to the `REMOTE_ID` environment variable; if
//! neither is available, resolution is deferred until the first operation is
//! actually attempted (so a session that never touches the filesystem never
//! has to pay for remote bring-up at all).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_protocol::GitRepoInfo;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::adapter::CancelSignal;
use crate::adapter::CommandOutput;
use crate::adapter::ExecutionAdapter;
use crate::adapter::FileEdit;
use crate::adapter::FileRead;
use crate::adapter::GlobOpts;
use crate::adapter::LsResult;
use crate::error::AdapterError;
use crate::error::Result;

/// `sessionId -> remoteId`. Supplied by the caller when
/// `environment.type = "remote"`.
pub type RemoteIdResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct RemoteAdapter {
    session_id: String,
    base_url: String,
    resolver: Option<RemoteIdResolver>,
    client: reqwest::Client,
}

impl RemoteAdapter {
    pub fn new(session_id: impl Into<String>, base_url: impl Into<String>, resolver: Option<RemoteIdResolver>) -> Self {
        Self {
            session_id: session_id.into(),
            base_url: base_url.into(),
            resolver,
            client: reqwest::Client::new(),
        }
    }

    fn resolve_remote_id(&self) -> Result<String> {
        if let Some(resolver) = &self.resolver
            && let Some(id) = resolver(&self.session_id)
        {
            return Ok(id);
        }
        std::env::var("REMOTE_ID").map_err(|_| {
            AdapterError::Backend(format!(
                "no remote id for session {}: supply a resolver or set REMOTE_ID",
                self.session_id
            ))
        })
    }

    async fn rpc<T: for<'de> Deserialize<'de>>(&self, op: &str, args: Value) -> Result<T> {
        let remote_id = self.resolve_remote_id()?;
        let url = format!("{}/sandboxes/{remote_id}/rpc", self.base_url);
        let body = json!({ "op": op, "args": args });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Backend(format!("remote sandbox unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AdapterError::Backend(format!(
                "remote sandbox returned {} for op {op}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::Backend(format!("malformed remote sandbox response: {e}")))
    }
}

#[derive(Serialize)]
struct ExecArgs<'a> {
    command: &'a [String],
    working_dir: Option<String>,
    timeout_ms: Option<u64>,
}

#[async_trait]
impl ExecutionAdapter for RemoteAdapter {
    async fn execute_command(
        &self,
        _exec_id: &str,
        command: &[String],
        working_dir: Option<&Path>,
        timeout_ms: Option<u64>,
        cancel: CancelSignal,
    ) -> Result<CommandOutput> {
        let args = ExecArgs {
            command,
            working_dir: working_dir.map(|p| p.display().to_string()),
            timeout_ms,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdapterError::Cancelled),
            result = self.rpc("execute_command", serde_json::to_value(args)?) => result,
        }
    }

    async fn read_file(
        &self,
        _exec_id: &str,
        path: &Path,
        max_size: Option<usize>,
        line_offset: Option<usize>,
        line_count: Option<usize>,
        encoding: Option<&str>,
    ) -> Result<FileRead> {
        self.rpc(
            "read_file",
            json!({
                "path": path.display().to_string(),
                "max_size": max_size,
                "line_offset": line_offset,
                "line_count": line_count,
                "encoding": encoding,
            }),
        )
        .await
    }

    async fn write_file(
        &self,
        _exec_id: &str,
        path: &Path,
        content: &str,
        encoding: Option<&str>,
    ) -> Result<()> {
        self.rpc(
            "write_file",
            json!({ "path": path.display().to_string(), "content": content, "encoding": encoding }),
        )
        .await
    }

    async fn edit_file(
        &self,
        _exec_id: &str,
        path: &Path,
        search_code: &str,
        replace_code: &str,
        encoding: Option<&str>,
    ) -> Result<FileEdit> {
        self.rpc(
            "edit_file",
            json!({
                "path": path.display().to_string(),
                "search_code": search_code,
                "replace_code": replace_code,
                "encoding": encoding,
            }),
        )
        .await
    }

    async fn glob(&self, _exec_id: &str, pattern: &str, opts: GlobOpts) -> Result<Vec<String>> {
        self.rpc(
            "glob",
            json!({
                "pattern": pattern,
                "root": opts.root.map(|p| p.display().to_string()),
                "case_sensitive": opts.case_sensitive,
            }),
        )
        .await
    }

    async fn ls(&self, _exec_id: &str, dir: &Path, show_hidden: bool, details: bool) -> Result<LsResult> {
        self.rpc(
            "ls",
            json!({ "dir": dir.display().to_string(), "show_hidden": show_hidden, "details": details }),
        )
        .await
    }

    async fn generate_directory_map(&self, root: &Path, max_depth: usize) -> Result<String> {
        self.rpc(
            "generate_directory_map",
            json!({ "root": root.display().to_string(), "max_depth": max_depth }),
        )
        .await
    }

    async fn get_directory_structures(&self) -> Result<HashMap<String, String>> {
        self.rpc("get_directory_structures", json!({})).await
    }

    async fn get_git_repository_info(&self) -> Result<Vec<GitRepoInfo>> {
        self.rpc("get_git_repository_info", json!({})).await
    }
}
