//! Session persistence (external collaborator per spec.md §6, out of scope
//! for `conveyor-core`). One JSON file per session under a cwd-scoped
//! directory, plus a `last.json` pointer — the same shape as the teacher's
//! JSONL rollout recorder in spirit (flush-on-write, directory under a
//! platform app-data root), but a single JSON document per session rather
//! than an append-only log, matching the layout spec.md names exactly.

use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use conveyor_protocol::Message;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedSession {
    pub created_at: String,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LastPointer {
    file: PathBuf,
}

/// `<app-data-root>/conveyor/sessions/<base64url(cwd)>/`. Honors
/// `CONVEYOR_HOME` when set, mirroring the teacher's `CODEX_HOME` override,
/// so tests don't have to write into the real platform app-data directory.
fn sessions_dir(cwd: &Path) -> anyhow::Result<PathBuf> {
    let data_root = if let Ok(val) = std::env::var("CONVEYOR_HOME") {
        PathBuf::from(val)
    } else {
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("no platform app-data directory available"))?
    };
    let cwd_key = URL_SAFE_NO_PAD.encode(cwd.to_string_lossy().as_bytes());
    Ok(data_root.join("conveyor").join("sessions").join(cwd_key))
}

pub async fn save_session(cwd: &Path, session: &PersistedSession) -> anyhow::Result<PathBuf> {
    let dir = sessions_dir(cwd)?;
    tokio::fs::create_dir_all(&dir).await?;

    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let safe_timestamp = timestamp.replace(':', "-");
    let file_path = dir.join(format!("{safe_timestamp}.json"));

    let body = serde_json::to_vec_pretty(session)?;
    tokio::fs::write(&file_path, &body).await?;

    let pointer = LastPointer { file: file_path.clone() };
    tokio::fs::write(dir.join("last.json"), serde_json::to_vec(&pointer)?).await?;

    Ok(file_path)
}

pub async fn load_session(path: &Path) -> anyhow::Result<PersistedSession> {
    let body = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn load_last_session(cwd: &Path) -> anyhow::Result<Option<PersistedSession>> {
    let dir = sessions_dir(cwd)?;
    let pointer_path = dir.join("last.json");
    if !pointer_path.exists() {
        return Ok(None);
    }
    let pointer: LastPointer = serde_json::from_slice(&tokio::fs::read(pointer_path).await?)?;
    Ok(Some(load_session(&pointer.file).await?))
}
