//! The execution adapter: a backend-neutral capability set for filesystem,
//! process, and search primitives. `ExecutionAdapter` is a trait, not a class
//! family, so adding a backend is just implementing these methods and wiring
//! the result into [`crate::factory`].

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use conveyor_protocol::GitRepoInfo;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Hard caps enforced by every adapter implementation regardless of what the
/// caller requested, matching the tool-layer caps in the design notes.
pub const MAX_READ_FILE_BYTES: usize = 500 * 1024;
pub const MAX_READ_FILE_LINES: usize = 1000;

/// Cooperative cancellation token threaded through every adapter call and
/// every tool invocation. Re-exported here so downstream crates share one
/// definition.
pub type CancelSignal = CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRead {
    pub content: String,
    pub total_lines: usize,
    pub returned_lines: usize,
    pub line_offset: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub bytes_written: usize,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LsResult {
    pub entries: Vec<LsEntry>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GlobOpts {
    pub root: Option<PathBuf>,
    pub case_sensitive: bool,
}

/// A capability set, implemented once per backend (host, container, remote).
/// Every state-changing method (`write_file`, `edit_file`,
/// `execute_command`) is the set the checkpointing wrapper snapshots before
/// forwarding to the real implementation.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn execute_command(
        &self,
        exec_id: &str,
        command: &[String],
        working_dir: Option<&Path>,
        timeout_ms: Option<u64>,
        cancel: CancelSignal,
    ) -> Result<CommandOutput>;

    async fn read_file(
        &self,
        exec_id: &str,
        path: &Path,
        max_size: Option<usize>,
        line_offset: Option<usize>,
        line_count: Option<usize>,
        encoding: Option<&str>,
    ) -> Result<FileRead>;

    async fn write_file(
        &self,
        exec_id: &str,
        path: &Path,
        content: &str,
        encoding: Option<&str>,
    ) -> Result<()>;

    async fn edit_file(
        &self,
        exec_id: &str,
        path: &Path,
        search_code: &str,
        replace_code: &str,
        encoding: Option<&str>,
    ) -> Result<FileEdit>;

    async fn glob(&self, exec_id: &str, pattern: &str, opts: GlobOpts) -> Result<Vec<String>>;

    async fn ls(
        &self,
        exec_id: &str,
        dir: &Path,
        show_hidden: bool,
        details: bool,
    ) -> Result<LsResult>;

    async fn generate_directory_map(&self, root: &Path, max_depth: usize) -> Result<String>;

    async fn get_directory_structures(&self) -> Result<HashMap<String, String>>;

    async fn get_git_repository_info(&self) -> Result<Vec<GitRepoInfo>>;
}
