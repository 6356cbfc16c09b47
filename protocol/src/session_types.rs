//! Types exchanged with the checkpoint manager (`conveyor_exec::checkpoint`)
//! and reported on the event bus.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

/// Why a snapshot was taken. Mirrors the state-changing adapter operations
/// that the checkpointing wrapper guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    WriteFile,
    EditFile,
    Bash,
    Other(String),
}

impl std::fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotReason::WriteFile => write!(f, "writeFile"),
            SnapshotReason::EditFile => write!(f, "editFile"),
            SnapshotReason::Bash => write!(f, "bash"),
            SnapshotReason::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Metadata committed into a shadow repository by [`SnapshotReason`]-tagged
/// message: `"<timestamp>::<JSON(M)>"`. Kept separate from the commit message
/// encoding so tests can assert on the structured form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub session_id: String,
    pub tool_execution_id: String,
    /// SHA of the host repository's own HEAD at snapshot time, recorded for
    /// diagnostics; the shadow repo never writes to the host's `.git`.
    pub host_commit: Option<String>,
    pub reason: SnapshotReason,
    pub timestamp: OffsetDateTime,
}

/// Emitted on the event bus as `checkpoint:ready` and handed back to callers
/// of the checkpointing wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub session_id: String,
    pub tool_execution_id: String,
    pub host_commits: HashMap<String, String>,
    pub shadow_commits: HashMap<String, String>,
    #[serde(with = "serde_bytes_map")]
    pub bundles: HashMap<String, Vec<u8>>,
    pub repo_count: usize,
    pub timestamp: OffsetDateTime,
}

/// Summary of one repository's git state, surfaced via
/// `ExecutionAdapter::get_git_repository_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRepoInfo {
    pub root: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub dirty: bool,
}

/// `serde` doesn't derive `Vec<u8>` as base64 by default; bundles are
/// opaque binary blobs so we store them as base64 strings on the wire and as
/// raw bytes in memory.
mod serde_bytes_map {
    use std::collections::HashMap;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serialize;
    use serde::Serializer;

    pub fn serialize<S>(map: &HashMap<String, Vec<u8>>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: HashMap<&String, String> = map
            .iter()
            .map(|(k, v)| (k, STANDARD.encode(v)))
            .collect();
        encoded.serialize(ser)
    }

    pub fn deserialize<'de, D>(de: D) -> Result<HashMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: HashMap<String, String> = HashMap::deserialize(de)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v)
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
