//! Shadow-repository snapshot and restore (§4.3). Every operation here goes
//! through an explicit `--git-dir`/`--work-tree` pair so the host's own
//! `.git` is never touched; callers only ever interact with
//! `R/.agent-shadow/<sessionId>`.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use conveyor_protocol::CheckpointPayload;
use conveyor_protocol::SnapshotMetadata;
use time::OffsetDateTime;
use tokio::process::Command;
use tracing::debug;

use crate::error::AdapterError;
use crate::error::Result;

const SHADOW_DIR_NAME: &str = ".agent-shadow";
const CHECKPOINT_AUTHOR_NAME: &str = "checkpoint";
const CHECKPOINT_AUTHOR_EMAIL: &str = "checkpoint@local";

const FIXED_EXCLUDES: &[&str] = &["node_modules/", ".git/", "dist/", "*.log", ".agent-shadow/"];

pub struct CheckpointManager {
    session_id: String,
}

impl CheckpointManager {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn shadow_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(SHADOW_DIR_NAME).join(&self.session_id)
    }

    /// Initialize the shadow repository for `repo_root`: verify it is a real
    /// git repository, create the bare shadow repo, seed the exclusion
    /// file, configure the checkpoint author, and commit an empty root
    /// commit if the shadow has no `HEAD` yet. Idempotent.
    pub async fn init_repo(&self, repo_root: &Path) -> Result<()> {
        verify_is_git_repo(repo_root).await?;

        let shadow = self.shadow_dir(repo_root);
        tokio::fs::create_dir_all(&shadow).await?;

        if !shadow.join("HEAD").exists() {
            run_git(&["init", "--bare", &shadow.display().to_string()], None).await?;
        }

        self.configure_author(repo_root).await?;
        self.seed_exclude_file(repo_root).await?;

        let has_head = self.git(repo_root, &["rev-parse", "--verify", "HEAD"]).await.is_ok();
        if !has_head {
            self.git(
                repo_root,
                &["commit", "--allow-empty", "-m", "checkpoint: initial snapshot"],
            )
            .await?;
        }

        Ok(())
    }

    /// Initialize every repo in deterministic lexicographic order, per the
    /// multi-repo contract.
    pub async fn init_all(&self, repo_roots: &[PathBuf]) -> Result<()> {
        for root in sorted(repo_roots) {
            self.init_repo(root).await?;
        }
        Ok(())
    }

    /// Snapshot one repository. Returns the shadow commit SHA and a
    /// `bundle --all` of the shadow repo at that commit. Re-snapshotting
    /// with the same `tool_execution_id` force-updates the tag, so the
    /// operation is idempotent (P3).
    pub async fn snapshot_repo(
        &self,
        repo_root: &Path,
        metadata: &SnapshotMetadata,
    ) -> Result<(String, Vec<u8>)> {
        debug!(repo = %repo_root.display(), tool_execution_id = %metadata.tool_execution_id, "checkpoint: snapshot");

        self.git(repo_root, &["add", "-A"]).await?;

        let message = format!(
            "{}::{}",
            metadata.timestamp.unix_timestamp(),
            serde_json::to_string(metadata)?
        );
        self.git(repo_root, &["commit", "--allow-empty", "-m", &message])
            .await?;

        let tag = checkpoint_tag(&metadata.tool_execution_id);
        self.git(repo_root, &["tag", "-f", &tag, "HEAD"]).await?;

        let sha_output = self.git(repo_root, &["rev-parse", "HEAD"]).await?;
        let sha = String::from_utf8_lossy(&sha_output.stdout).trim().to_string();

        let bundle = self.export_bundle(repo_root).await?;

        Ok((sha, bundle))
    }

    /// Snapshot every repo in lexicographic order and aggregate the results
    /// into one [`CheckpointPayload`]. A failure partway through is
    /// surfaced immediately without rolling back repos already snapshotted
    /// (callers may re-snapshot; `tool_execution_id` reuse makes that safe).
    pub async fn snapshot_all(
        &self,
        repo_roots: &[PathBuf],
        tool_execution_id: &str,
        metadata_for: impl Fn(&Path) -> SnapshotMetadata,
    ) -> Result<CheckpointPayload> {
        let mut shadow_commits = HashMap::new();
        let mut host_commits = HashMap::new();
        let mut bundles = HashMap::new();

        for root in sorted(repo_roots) {
            let metadata = metadata_for(root);
            let (sha, bundle) = self.snapshot_repo(root, &metadata).await?;
            let key = root.display().to_string();
            shadow_commits.insert(key.clone(), sha);
            if let Some(host_commit) = metadata.host_commit {
                host_commits.insert(key.clone(), host_commit);
            }
            bundles.insert(key, bundle);
        }

        Ok(CheckpointPayload {
            session_id: self.session_id.clone(),
            tool_execution_id: tool_execution_id.to_string(),
            host_commits,
            shadow_commits,
            repo_count: repo_roots.len(),
            bundles,
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Restore one repository's worktree to the state captured by
    /// `tool_execution_id`. Resolves the tag, then force-checks-out that
    /// SHA against the explicit work-tree so the host's own `.git` is
    /// untouched (P4).
    pub async fn restore_repo(&self, repo_root: &Path, tool_execution_id: &str) -> Result<String> {
        debug!(repo = %repo_root.display(), tool_execution_id, "checkpoint: restore");

        let tag = checkpoint_tag(tool_execution_id);
        let sha_output = self
            .git(repo_root, &["rev-parse", &tag])
            .await
            .map_err(|_| {
                AdapterError::NotFound(format!("checkpoint tag {tag} in {}", repo_root.display()))
            })?;
        let sha = String::from_utf8_lossy(&sha_output.stdout).trim().to_string();

        self.git(repo_root, &["checkout", "-f", &sha])
            .await
            .map_err(|_| AdapterError::Backend(format!("checkout of {sha} failed; worktree left untouched")))?;

        Ok(sha)
    }

    /// Restore every repo, in lexicographic order, to the same
    /// `tool_execution_id`. Returns the restored SHA per repo path.
    pub async fn restore_all(
        &self,
        repo_roots: &[PathBuf],
        tool_execution_id: &str,
    ) -> Result<HashMap<String, String>> {
        let mut restored = HashMap::new();
        for root in sorted(repo_roots) {
            let sha = self.restore_repo(root, tool_execution_id).await?;
            restored.insert(root.display().to_string(), sha);
        }
        Ok(restored)
    }

    async fn export_bundle(&self, repo_root: &Path) -> Result<Vec<u8>> {
        let tmp = tempfile::NamedTempFile::new()?;
        let tmp_path = tmp.path().to_path_buf();
        self.git(
            repo_root,
            &["bundle", "create", &tmp_path.display().to_string(), "--all"],
        )
        .await?;
        let bytes = tokio::fs::read(&tmp_path).await?;
        // `tmp` is removed on drop; dropped explicitly here for clarity.
        drop(tmp);
        Ok(bytes)
    }

    async fn configure_author(&self, repo_root: &Path) -> Result<()> {
        self.git(repo_root, &["config", "user.name", CHECKPOINT_AUTHOR_NAME])
            .await?;
        self.git(repo_root, &["config", "user.email", CHECKPOINT_AUTHOR_EMAIL])
            .await?;
        Ok(())
    }

    async fn seed_exclude_file(&self, repo_root: &Path) -> Result<()> {
        let mut lines = Vec::new();
        if let Ok(gitignore) = tokio::fs::read_to_string(repo_root.join(".gitignore")).await {
            lines.extend(gitignore.lines().map(str::to_string));
        }
        lines.extend(FIXED_EXCLUDES.iter().map(|s| s.to_string()));

        let exclude_path = self.shadow_dir(repo_root).join("info").join("exclude");
        if let Some(parent) = exclude_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(exclude_path, lines.join("\n")).await?;
        Ok(())
    }

    async fn git(&self, repo_root: &Path, args: &[&str]) -> Result<std::process::Output> {
        let shadow = self.shadow_dir(repo_root).display().to_string();
        let work_tree = repo_root.display().to_string();
        let mut full_args = vec!["--git-dir".to_string(), shadow, "--work-tree".to_string(), work_tree];
        full_args.extend(args.iter().map(|s| s.to_string()));
        run_git(&full_args.iter().map(String::as_str).collect::<Vec<_>>(), None).await
    }
}

fn checkpoint_tag(tool_execution_id: &str) -> String {
    format!("chkpt/{tool_execution_id}")
}

fn sorted(paths: &[PathBuf]) -> Vec<&PathBuf> {
    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();
    sorted
}

async fn verify_is_git_repo(repo_root: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["-C", &repo_root.display().to_string(), "rev-parse", "--is-inside-work-tree"])
        .output()
        .await?;
    if !output.status.success() || String::from_utf8_lossy(&output.stdout).trim() != "true" {
        return Err(AdapterError::Other(format!(
            "{} is not a git repository",
            repo_root.display()
        )));
    }
    Ok(())
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<std::process::Output> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(AdapterError::Backend(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_protocol::SnapshotReason;
    use tokio::process::Command as TokioCommand;

    async fn init_host_repo(dir: &Path) {
        TokioCommand::new("git")
            .args(["init"])
            .current_dir(dir)
            .output()
            .await
            .expect("git init");
        TokioCommand::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .output()
            .await
            .expect("git config email");
        TokioCommand::new("git")
            .args(["config", "user.name", "test"])
            .current_dir(dir)
            .output()
            .await
            .expect("git config name");
    }

    fn metadata(tool_execution_id: &str) -> SnapshotMetadata {
        SnapshotMetadata {
            session_id: "sess-1".to_string(),
            tool_execution_id: tool_execution_id.to_string(),
            host_commit: None,
            reason: SnapshotReason::WriteFile,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn snapshot_then_restore_round_trips_worktree() {
        let dir = tempfile::tempdir().expect("tempdir");
        init_host_repo(dir.path()).await;
        tokio::fs::write(dir.path().join("x.txt"), "A").await.expect("write");
        TokioCommand::new("git")
            .args(["add", "-A"])
            .current_dir(dir.path())
            .output()
            .await
            .expect("host add");
        TokioCommand::new("git")
            .args(["commit", "-m", "initial"])
            .current_dir(dir.path())
            .output()
            .await
            .expect("host commit");
        let host_head_before = TokioCommand::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir.path())
            .output()
            .await
            .expect("host rev-parse");

        let manager = CheckpointManager::new("sess-1");
        manager.init_repo(dir.path()).await.expect("init");
        manager
            .snapshot_repo(dir.path(), &metadata("exec-1"))
            .await
            .expect("snapshot");

        tokio::fs::write(dir.path().join("x.txt"), "B").await.expect("rewrite");

        manager.restore_repo(dir.path(), "exec-1").await.expect("restore");

        let restored = tokio::fs::read_to_string(dir.path().join("x.txt"))
            .await
            .expect("read restored");
        assert_eq!(restored, "A");

        // S5: the shadow repo is entirely separate bookkeeping; the host's
        // own `.git` HEAD must be untouched by snapshot/restore.
        let host_head_after = TokioCommand::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir.path())
            .output()
            .await
            .expect("host rev-parse");
        assert_eq!(host_head_before.stdout, host_head_after.stdout);
    }

    #[tokio::test]
    async fn resnapshotting_same_tool_execution_id_moves_tag_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        init_host_repo(dir.path()).await;
        tokio::fs::write(dir.path().join("x.txt"), "A").await.expect("write");

        let manager = CheckpointManager::new("sess-2");
        manager.init_repo(dir.path()).await.expect("init");
        let (first_sha, _) = manager
            .snapshot_repo(dir.path(), &metadata("exec-1"))
            .await
            .expect("first snapshot");

        tokio::fs::write(dir.path().join("x.txt"), "A").await.expect("rewrite same content");
        let (second_sha, _) = manager
            .snapshot_repo(dir.path(), &metadata("exec-1"))
            .await
            .expect("second snapshot");

        // The commit objects differ (new timestamped message each time) but
        // the tree they point at must be identical since the worktree did
        // not change between snapshots (P3).
        assert_ne!(first_sha, second_sha);

        let shadow = manager.shadow_dir(dir.path()).display().to_string();
        let tree_of = |sha: &str| async {
            let output = TokioCommand::new("git")
                .args(["--git-dir", &shadow, "rev-parse", &format!("{sha}^{{tree}}")])
                .output()
                .await
                .expect("rev-parse tree");
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        };
        assert_eq!(tree_of(&first_sha).await, tree_of(&second_sha).await);
    }
}
