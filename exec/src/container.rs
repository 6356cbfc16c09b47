//! The `Container` execution adapter: every primitive is forwarded through
//! `docker exec` into a pre-existing container. Bring-up of the container
//! itself (image selection, volume mounts, lifecycle) is the caller's
//! concern; this adapter only needs a running container id to talk to.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use conveyor_protocol::GitRepoInfo;
use globset::Glob;
use tokio::process::Command;
use tokio::time::Duration;
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

pub struct ContainerAdapter {
    container_id: String,
    /// Repo roots as seen *inside* the container.
    repo_roots: Vec<String>,
}

impl ContainerAdapter {
    pub fn new(container_id: impl Into<String>, repo_roots: Vec<String>) -> Self {
        Self {
            container_id: container_id.into(),
            repo_roots,
        }
    }

    fn docker_exec(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("exec").arg(&self.container_id);
        cmd.args(args);
        cmd
    }

    async fn run_inside(
        &self,
        shell_command: &str,
        timeout_ms: Option<u64>,
        cancel: CancelSignal,
    ) -> Result<CommandOutput> {
        let cmd = self.docker_exec(&["sh", "-lc", shell_command]);
        crate::util::run(cmd, timeout_ms, cancel).await
    }
}

#[async_trait]
impl ExecutionAdapter for ContainerAdapter {
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
        debug!(exec_id, container = %self.container_id, cmd = ?command, "container: execute_command");

        let mut cmd = self.docker_exec(&[]);
        if let Some(dir) = working_dir {
            cmd.arg("-w").arg(dir);
        }
        cmd.args(command);
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
        debug!(exec_id, path = %path.display(), "container: read_file");
        let cap = max_size.unwrap_or(MAX_READ_FILE_BYTES).min(MAX_READ_FILE_BYTES);
        let output = self
            .run_inside(&format!("cat -- '{}'", path.display()), None, CancelSignal::new())
            .await?;
        if output.exit_code != 0 {
            return Err(AdapterError::NotFound(path.display().to_string()));
        }

        let all_lines: Vec<&str> = output.stdout.lines().collect();
        let total_lines = all_lines.len();
        let offset = line_offset.unwrap_or(0).min(total_lines);
        let count = line_count.unwrap_or(MAX_READ_FILE_LINES).min(MAX_READ_FILE_LINES);
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
        debug!(exec_id, path = %path.display(), "container: write_file");
        // `docker exec -i` with stdin piped through `cat` avoids fighting
        // with shell quoting for arbitrary file content.
        let mut cmd = self.docker_exec(&["sh", "-lc", &format!("cat > '{}'", path.display())]);
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::piped());
        let mut child = cmd.spawn()?;
        {
            use tokio::io::AsyncWriteExt;
            let mut stdin = child.stdin.take().ok_or(AdapterError::Backend(
                "container stdin unavailable".to_string(),
            ))?;
            stdin.write_all(content.as_bytes()).await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(AdapterError::Backend(format!(
                "writing {} inside container {} failed",
                path.display(),
                self.container_id
            )));
        }
        Ok(())
    }

    async fn edit_file(
        &self,
        exec_id: &str,
        path: &Path,
        search_code: &str,
        replace_code: &str,
        encoding: Option<&str>,
    ) -> Result<FileEdit> {
        debug!(exec_id, path = %path.display(), "container: edit_file");
        let current = self
            .run_inside(&format!("cat -- '{}'", path.display()), None, CancelSignal::new())
            .await?;
        if current.exit_code != 0 {
            return Err(AdapterError::NotFound(path.display().to_string()));
        }

        let crlf = current.stdout.contains("\r\n");
        let normalized = current.stdout.replace("\r\n", "\n");
        let needle = search_code.replace("\r\n", "\n");
        let count = normalized.matches(&needle).count();
        if count != 1 {
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

        self.write_file(exec_id, path, &final_content, encoding).await?;
        Ok(FileEdit {
            path: path.display().to_string(),
            bytes_written: final_content.len(),
            deleted,
        })
    }

    async fn glob(&self, exec_id: &str, pattern: &str, opts: GlobOpts) -> Result<Vec<String>> {
        debug!(exec_id, pattern, "container: glob");
        let root = opts
            .root
            .map(|p| p.display().to_string())
            .or_else(|| self.repo_roots.first().cloned())
            .unwrap_or_else(|| ".".to_string());

        let output = self
            .run_inside(&format!("find '{root}' -print"), None, CancelSignal::new())
            .await?;
        let glob = Glob::new(pattern)
            .map_err(|e| AdapterError::Other(format!("invalid glob pattern: {e}")))?
            .compile_matcher();

        let mut matches: Vec<String> = output
            .stdout
            .lines()
            .filter_map(|line| line.strip_prefix(&root).map(|s| s.trim_start_matches('/')))
            .filter(|rel| !rel.is_empty() && glob.is_match(rel))
            .map(str::to_string)
            .collect();
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
        debug!(exec_id, dir = %dir.display(), "container: ls");
        let output = self
            .run_inside(
                &format!("ls -1a -- '{}'", dir.display()),
                None,
                CancelSignal::new(),
            )
            .await?;
        if output.exit_code != 0 {
            return Err(AdapterError::NotFound(dir.display().to_string()));
        }

        let mut entries: Vec<LsEntry> = output
            .stdout
            .lines()
            .filter(|n| *n != "." && *n != "..")
            .filter(|n| show_hidden || !n.starts_with('.'))
            .map(|name| LsEntry {
                name: name.to_string(),
                is_dir: false,
                size: None,
            })
            .collect();

        if details {
            // A second pass with `stat` would be needed for exact sizes;
            // kept as a known limitation of the container backend.
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let truncated = entries.len() > DEFAULT_LS_LIMIT;
        entries.truncate(DEFAULT_LS_LIMIT);
        Ok(LsResult { entries, truncated })
    }

    async fn generate_directory_map(&self, root: &Path, max_depth: usize) -> Result<String> {
        let output = self
            .run_inside(
                &format!("find '{}' -maxdepth {}", root.display(), max_depth),
                None,
                CancelSignal::new(),
            )
            .await?;
        Ok(output.stdout)
    }

    async fn get_directory_structures(&self) -> Result<HashMap<String, String>> {
        let mut out = HashMap::new();
        for root in &self.repo_roots {
            let map = self
                .generate_directory_map(Path::new(root), 10)
                .await
                .unwrap_or_default();
            out.insert(root.clone(), map);
        }
        Ok(out)
    }

    async fn get_git_repository_info(&self) -> Result<Vec<GitRepoInfo>> {
        let mut infos = Vec::new();
        for root in &self.repo_roots {
            let rev_parse = self
                .run_git_timed(root, "rev-parse --git-dir")
                .await;
            if !rev_parse.as_ref().is_ok_and(|o| o.exit_code == 0) {
                warn!(root, "not a git repository inside container");
                continue;
            }

            let commit = self.run_git_timed(root, "rev-parse HEAD").await.ok();
            let branch = self
                .run_git_timed(root, "rev-parse --abbrev-ref HEAD")
                .await
                .ok();
            let status = self.run_git_timed(root, "status --porcelain").await.ok();

            infos.push(GitRepoInfo {
                root: root.clone(),
                branch: branch
                    .filter(|o| o.exit_code == 0)
                    .map(|o| o.stdout.trim().to_string())
                    .filter(|b| b != "HEAD"),
                commit: commit
                    .filter(|o| o.exit_code == 0)
                    .map(|o| o.stdout.trim().to_string()),
                dirty: status.is_some_and(|o| !o.stdout.trim().is_empty()),
            });
        }
        Ok(infos)
    }
}

impl ContainerAdapter {
    async fn run_git_timed(&self, root: &str, git_args: &str) -> Result<CommandOutput> {
        timeout(
            GIT_COMMAND_TIMEOUT,
            self.run_inside(&format!("cd '{root}' && git {git_args}"), None, CancelSignal::new()),
        )
        .await
        .map_err(|_| AdapterError::Timeout(GIT_COMMAND_TIMEOUT.as_millis() as u64))?
    }
}
