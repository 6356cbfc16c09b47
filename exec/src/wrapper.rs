//! The checkpointing wrapper (§4.4): decorates any [`ExecutionAdapter`] so
//! that `write_file`, `edit_file`, and `execute_command` snapshot the tracked
//! repositories before the real operation runs. A crash between snapshot and
//! operation always leaves a restorable state (design note: determinism of
//! side-effects).

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use conveyor_protocol::CheckpointPayload;
use conveyor_protocol::GitRepoInfo;
use conveyor_protocol::SnapshotMetadata;
use conveyor_protocol::SnapshotReason;
use time::OffsetDateTime;
use tokio::sync::OnceCell;

use crate::adapter::CancelSignal;
use crate::adapter::CommandOutput;
use crate::adapter::ExecutionAdapter;
use crate::adapter::FileEdit;
use crate::adapter::FileRead;
use crate::adapter::GlobOpts;
use crate::adapter::LsResult;
use crate::checkpoint::CheckpointManager;
use crate::error::Result;

/// Invoked with the payload of every successful snapshot, so the caller
/// (which owns the context window and the event bus) can publish
/// `checkpoint:ready` and update `lastCheckpointId` without this crate
/// needing to know about either.
pub type SnapshotHook = Arc<dyn Fn(&CheckpointPayload) + Send + Sync>;

pub struct CheckpointingWrapper {
    inner: Arc<dyn ExecutionAdapter>,
    manager: CheckpointManager,
    repo_roots: Vec<PathBuf>,
    init: OnceCell<()>,
    /// Set by the driver to `true` whenever the context window is empty;
    /// snapshots are skipped in that state because there is no message to
    /// attach `lastCheckpointId` to.
    context_empty: AtomicBool,
    on_snapshot: Option<SnapshotHook>,
}

impl CheckpointingWrapper {
    pub fn new(inner: Arc<dyn ExecutionAdapter>, session_id: impl Into<String>, repo_roots: Vec<PathBuf>) -> Self {
        Self {
            inner,
            manager: CheckpointManager::new(session_id),
            repo_roots,
            init: OnceCell::new(),
            context_empty: AtomicBool::new(true),
            on_snapshot: None,
        }
    }

    pub fn with_snapshot_hook(mut self, hook: SnapshotHook) -> Self {
        self.on_snapshot = Some(hook);
        self
    }

    pub fn set_context_empty(&self, empty: bool) {
        self.context_empty.store(empty, Ordering::SeqCst);
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async { self.manager.init_all(&self.repo_roots).await })
            .await?;
        Ok(())
    }

    async fn snapshot_before(&self, reason: SnapshotReason, tool_execution_id: &str) -> Result<()> {
        if self.context_empty.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.ensure_initialized().await?;

        let session_id = tool_execution_id.to_string();
        let payload = self
            .manager
            .snapshot_all(&self.repo_roots, tool_execution_id, |_root| SnapshotMetadata {
                session_id: session_id.clone(),
                tool_execution_id: tool_execution_id.to_string(),
                host_commit: None,
                reason: reason.clone(),
                timestamp: OffsetDateTime::now_utc(),
            })
            .await?;

        if let Some(hook) = &self.on_snapshot {
            hook(&payload);
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionAdapter for CheckpointingWrapper {
    async fn execute_command(
        &self,
        exec_id: &str,
        command: &[String],
        working_dir: Option<&Path>,
        timeout_ms: Option<u64>,
        cancel: CancelSignal,
    ) -> Result<CommandOutput> {
        self.snapshot_before(SnapshotReason::Bash, exec_id).await?;
        self.inner
            .execute_command(exec_id, command, working_dir, timeout_ms, cancel)
            .await
    }

    async fn read_file(
        &self,
        exec_id: &str,
        path: &Path,
        max_size: Option<usize>,
        line_offset: Option<usize>,
        line_count: Option<usize>,
        encoding: Option<&str>,
    ) -> Result<FileRead> {
        // Read-only: never snapshots.
        self.inner
            .read_file(exec_id, path, max_size, line_offset, line_count, encoding)
            .await
    }

    async fn write_file(
        &self,
        exec_id: &str,
        path: &Path,
        content: &str,
        encoding: Option<&str>,
    ) -> Result<()> {
        self.snapshot_before(SnapshotReason::WriteFile, exec_id).await?;
        self.inner.write_file(exec_id, path, content, encoding).await
    }

    async fn edit_file(
        &self,
        exec_id: &str,
        path: &Path,
        search_code: &str,
        replace_code: &str,
        encoding: Option<&str>,
    ) -> Result<FileEdit> {
        self.snapshot_before(SnapshotReason::EditFile, exec_id).await?;
        self.inner
            .edit_file(exec_id, path, search_code, replace_code, encoding)
            .await
    }

    async fn glob(&self, exec_id: &str, pattern: &str, opts: GlobOpts) -> Result<Vec<String>> {
        self.inner.glob(exec_id, pattern, opts).await
    }

    async fn ls(&self, exec_id: &str, dir: &Path, show_hidden: bool, details: bool) -> Result<LsResult> {
        self.inner.ls(exec_id, dir, show_hidden, details).await
    }

    async fn generate_directory_map(&self, root: &Path, max_depth: usize) -> Result<String> {
        self.inner.generate_directory_map(root, max_depth).await
    }

    async fn get_directory_structures(&self) -> Result<HashMap<String, String>> {
        self.inner.get_directory_structures().await
    }

    async fn get_git_repository_info(&self) -> Result<Vec<GitRepoInfo>> {
        self.inner.get_git_repository_info().await
    }
}
