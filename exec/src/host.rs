//! The `Host` execution adapter: runs commands and touches files directly on
//! the machine the agent runtime itself is running on. The simplest of the
//! three backends and the fallback target when a factory is configured for
//! auto-fallback (see [`crate::factory`]).

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use conveyor_protocol::GitRepoInfo;
use globset::Glob;
use ignore::WalkBuilder;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::adapter::CancelSignal;
use crate::adapter::CommandOutput;
use crate::adapter::ExecutionAdapter;
use crate::adapter::FileEdit;
use crate::adapter::FileRead;
use crate::adapter::GlobOpts;
use crate::adapter::LsEntry;
use crate::adapter::LsResult;
use crate::adapter::MAX_READ_FILE_BYTES;
use crate::adapter::MAX_READ_FILE_LINES;
use crate::error::AdapterError;
use crate::error::Result;
use crate::util::floor_char_boundary;

const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LS_LIMIT: usize = 100;

/// Execute commands and manipulate files using the host process and
/// filesystem directly. `repo_roots` drives the multi-repo queries
/// (`get_directory_structures`, `get_git_repository_info`); for a
/// single-repo session it holds exactly one path.
pub struct HostAdapter {
    repo_roots: Vec<PathBuf>,
}

impl HostAdapter {
    pub fn new(repo_roots: Vec<PathBuf>) -> Self {
        Self { repo_roots }
    }

    pub fn single(cwd: PathBuf) -> Self {
        Self::new(vec![cwd])
    }
}

fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n")
}

fn has_crlf(s: &str) -> bool {
    s.contains("\r\n")
}

#[async_trait]
impl ExecutionAdapter for HostAdapter {
    async fn execute_command(
        &self,
        exec_id: &str,
        command: &[String],
        working_dir: Option<&Path>,
        timeout_ms: Option<u64>,
        cancel: CancelSignal,
    ) -> Result<CommandOutput> {
        if command.is_empty() {
            return Err(AdapterError::Other("empty command".to_string()));
        }
        debug!(exec_id, cmd = ?command, "host: execute_command");

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        crate::util::run(cmd, timeout_ms, cancel).await
    }

    async fn read_file(
        &self,
        exec_id: &str,
        path: &Path,
        max_size: Option<usize>,
        line_offset: Option<usize>,
        line_count: Option<usize>,
        _encoding: Option<&str>,
    ) -> Result<FileRead> {
        debug!(exec_id, path = %path.display(), "host: read_file");
        let cap = max_size.unwrap_or(MAX_READ_FILE_BYTES).min(MAX_READ_FILE_BYTES);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| AdapterError::NotFound(path.display().to_string()))?;
        let text = String::from_utf8_lossy(&bytes).to_string();
        let all_lines: Vec<&str> = text.lines().collect();
        let total_lines = all_lines.len();

        let offset = line_offset.unwrap_or(0).min(total_lines);
        let requested_count = line_count.unwrap_or(MAX_READ_FILE_LINES);
        let count = requested_count.min(MAX_READ_FILE_LINES);
        let end = (offset + count).min(total_lines);

        let mut content = all_lines[offset..end].join("\n");
        let mut truncated = end < total_lines;
        if content.len() > cap {
            content.truncate(floor_char_boundary(&content, cap));
            truncated = true;
        }

        Ok(FileRead {
            content,
            total_lines,
            returned_lines: end - offset,
            line_offset: offset,
            truncated,
        })
    }

    async fn write_file(
        &self,
        exec_id: &str,
        path: &Path,
        content: &str,
        _encoding: Option<&str>,
    ) -> Result<()> {
        debug!(exec_id, path = %path.display(), "host: write_file");
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn edit_file(
        &self,
        exec_id: &str,
        path: &Path,
        search_code: &str,
        replace_code: &str,
        _encoding: Option<&str>,
    ) -> Result<FileEdit> {
        debug!(exec_id, path = %path.display(), "host: edit_file");
        let original = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| AdapterError::NotFound(path.display().to_string()))?;
        let crlf = has_crlf(&original);

        let normalized = normalize_line_endings(&original);
        let needle = normalize_line_endings(search_code);
        let count = normalized.matches(&needle).count();
        if count == 0 || count > 1 {
            return Err(AdapterError::AmbiguousEdit {
                path: path.display().to_string(),
                count,
            });
        }

        let replaced = normalized.replacen(&needle, replace_code, 1);
        let final_content = if crlf {
            replaced.replace('\n', "\r\n")
        } else {
            replaced
        };

        let deleted = final_content.is_empty();
        tokio::fs::write(path, &final_content).await?;

        Ok(FileEdit {
            path: path.display().to_string(),
            bytes_written: final_content.len(),
            deleted,
        })
    }

    async fn glob(&self, exec_id: &str, pattern: &str, opts: GlobOpts) -> Result<Vec<String>> {
        debug!(exec_id, pattern, "host: glob");
        let root = opts
            .root
            .or_else(|| self.repo_roots.first().cloned())
            .unwrap_or_else(|| PathBuf::from("."));

        let glob = Glob::new(pattern)
            .map_err(|e| AdapterError::Other(format!("invalid glob pattern: {e}")))?
            .compile_matcher();

        let mut matches = Vec::new();
        for entry in WalkBuilder::new(&root).hidden(false).build().flatten() {
            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let candidate = if opts.case_sensitive {
                rel.to_string_lossy().to_string()
            } else {
                rel.to_string_lossy().to_lowercase()
            };
            if glob.is_match(&candidate) || glob.is_match(rel) {
                matches.push(rel.to_string_lossy().to_string());
            }
        }
        matches.sort();
        Ok(matches)
    }

    async fn ls(
        &self,
        exec_id: &str,
        dir: &Path,
        show_hidden: bool,
        details: bool,
    ) -> Result<LsResult> {
        debug!(exec_id, dir = %dir.display(), "host: ls");
        let mut read_dir = tokio::fs::read_dir(dir)
            .await
            .map_err(|_| AdapterError::NotFound(dir.display().to_string()))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await.ok();
            entries.push(LsEntry {
                is_dir: metadata.as_ref().is_some_and(|m| m.is_dir()),
                size: if details {
                    metadata.as_ref().map(|m| m.len())
                } else {
                    None
                },
                name,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let truncated = entries.len() > DEFAULT_LS_LIMIT;
        entries.truncate(DEFAULT_LS_LIMIT);
        Ok(LsResult { entries, truncated })
    }

    async fn generate_directory_map(&self, root: &Path, max_depth: usize) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!("{}/\n", root.display()));
        for entry in WalkBuilder::new(root)
            .max_depth(Some(max_depth))
            .hidden(false)
            .build()
            .flatten()
        {
            let depth = entry.depth();
            if depth == 0 {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            out.push_str(&"  ".repeat(depth));
            out.push_str(&name);
            if entry.file_type().is_some_and(|t| t.is_dir()) {
                out.push('/');
            }
            out.push('\n');
        }
        Ok(out)
    }

    async fn get_directory_structures(&self) -> Result<HashMap<String, String>> {
        let mut out = HashMap::new();
        for root in &self.repo_roots {
            let map = self.generate_directory_map(root, 10).await?;
            out.insert(root.display().to_string(), map);
        }
        Ok(out)
    }

    async fn get_git_repository_info(&self) -> Result<Vec<GitRepoInfo>> {
        let mut infos = Vec::new();
        for root in &self.repo_roots {
            match collect_git_info(root).await {
                Some(info) => infos.push(info),
                None => warn!(root = %root.display(), "not a git repository"),
            }
        }
        Ok(infos)
    }
}

async fn collect_git_info(root: &Path) -> Option<GitRepoInfo> {
    let rev_parse = run_git(&["rev-parse", "--git-dir"], root).await?;
    if !rev_parse.status.success() {
        return None;
    }

    let (commit, branch, status) = tokio::join!(
        run_git(&["rev-parse", "HEAD"], root),
        run_git(&["rev-parse", "--abbrev-ref", "HEAD"], root),
        run_git(&["status", "--porcelain"], root),
    );

    let commit = commit
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());
    let branch = branch
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|b| b != "HEAD");
    let dirty = status.is_some_and(|o| !o.stdout.is_empty());

    Some(GitRepoInfo {
        root: root.display().to_string(),
        branch,
        commit,
        dirty,
    })
}

async fn run_git(args: &[&str], cwd: &Path) -> Option<std::process::Output> {
    timeout(GIT_COMMAND_TIMEOUT, Command::new("git").args(args).current_dir(cwd).output())
        .await
        .ok()?
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_file_caps_lines_at_the_adapter_maximum() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.txt");
        let body: String = (0..(MAX_READ_FILE_LINES * 2)).map(|i| format!("line{i}\n")).collect();
        tokio::fs::write(&path, body).await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let read = adapter
            .read_file("exec-1", &path, None, None, Some(MAX_READ_FILE_LINES * 10), None)
            .await
            .expect("read");

        assert_eq!(read.returned_lines, MAX_READ_FILE_LINES);
        assert!(read.truncated);
    }

    #[tokio::test]
    async fn read_file_honors_line_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "a\nb\nc\nd\n").await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let read = adapter.read_file("exec-1", &path, None, Some(2), Some(1), None).await.expect("read");

        assert_eq!(read.content, "c");
        assert_eq!(read.line_offset, 2);
    }

    #[tokio::test]
    async fn read_file_truncates_at_a_char_boundary_instead_of_panicking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("multibyte.txt");
        // byte 10 falls inside the 2-byte 'é' (bytes 9-10); a naive
        // `String::truncate(10)` panics here.
        let body = format!("{}é{}", "a".repeat(9), "bcdef");
        tokio::fs::write(&path, &body).await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let read = adapter.read_file("exec-1", &path, Some(10), None, None, None).await.expect("read does not panic");

        assert!(read.content.len() <= 10);
        assert!(read.truncated);
        assert_eq!(read.content, "a".repeat(9));
    }

    #[tokio::test]
    async fn edit_file_requires_exactly_one_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "needle hay needle").await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let result = adapter.edit_file("exec-1", &path, "needle", "straw", None).await;
        assert!(result.is_err(), "ambiguous match must be rejected");
    }

    #[tokio::test]
    async fn edit_file_preserves_crlf_line_endings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "one\r\ntwo\r\nthree\r\n").await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        adapter.edit_file("exec-1", &path, "two", "TWO", None).await.expect("edit");

        let result = tokio::fs::read(&path).await.unwrap();
        assert_eq!(result, b"one\r\nTWO\r\nthree\r\n");
    }

    #[tokio::test]
    async fn empty_replace_code_deletes_the_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "keep-REMOVE-keep").await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let edit = adapter.edit_file("exec-1", &path, "-REMOVE-", "", None).await.expect("edit");
        assert!(!edit.deleted);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "keepkeep");
    }

    #[tokio::test]
    async fn ls_hides_dotfiles_unless_requested() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join(".secret"), "").await.unwrap();
        tokio::fs::write(dir.path().join("visible"), "").await.unwrap();

        let adapter = HostAdapter::single(dir.path().to_path_buf());
        let shown = adapter.ls("exec-1", dir.path(), false, false).await.expect("ls");
        assert_eq!(shown.entries.len(), 1);

        let shown_hidden = adapter.ls("exec-1", dir.path(), true, false).await.expect("ls hidden");
        assert_eq!(shown_hidden.entries.len(), 2);
    }
}
