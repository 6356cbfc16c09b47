//! The fixed event catalog published on the per-session event bus
//! (`conveyor_core::events`). Payload shapes live here so that subscribers in
//! any crate can deserialize them without reaching into `core`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::session_types::CheckpointPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    #[serde(rename = "processing:started")]
    ProcessingStarted,
    #[serde(rename = "processing:completed")]
    ProcessingCompleted { response: String },
    #[serde(rename = "processing:error")]
    ProcessingError { message: String },
    #[serde(rename = "processing:aborted")]
    ProcessingAborted,

    #[serde(rename = "tool:execution:started")]
    ToolExecutionStarted { tool_use_id: String, tool_id: String },
    #[serde(rename = "tool:execution:completed")]
    ToolExecutionCompleted {
        tool_use_id: String,
        tool_id: String,
        duration_ms: u64,
    },
    #[serde(rename = "tool:execution:error")]
    ToolExecutionError {
        tool_use_id: String,
        tool_id: String,
        message: String,
    },

    #[serde(rename = "environment:status_changed")]
    EnvironmentStatusChanged { status: String },

    #[serde(rename = "checkpoint:ready")]
    CheckpointReady { payload: CheckpointPayload },

    #[serde(rename = "rollback:completed")]
    RollbackCompleted {
        restored: HashMap<String, String>,
    },

    #[serde(rename = "permission:requested")]
    PermissionRequested { tool_id: String, args: Value },
}

impl EventMsg {
    /// The catalog name, used as the subscription key in `EventBus::on`.
    pub fn name(&self) -> &'static str {
        match self {
            EventMsg::ProcessingStarted => "processing:started",
            EventMsg::ProcessingCompleted { .. } => "processing:completed",
            EventMsg::ProcessingError { .. } => "processing:error",
            EventMsg::ProcessingAborted => "processing:aborted",
            EventMsg::ToolExecutionStarted { .. } => "tool:execution:started",
            EventMsg::ToolExecutionCompleted { .. } => "tool:execution:completed",
            EventMsg::ToolExecutionError { .. } => "tool:execution:error",
            EventMsg::EnvironmentStatusChanged { .. } => "environment:status_changed",
            EventMsg::CheckpointReady { .. } => "checkpoint:ready",
            EventMsg::RollbackCompleted { .. } => "rollback:completed",
            EventMsg::PermissionRequested { .. } => "permission:requested",
        }
    }
}

/// An envelope wrapping an [`EventMsg`] with the session it belongs to.
/// Mirrors the `{id, msg}` shape of the upstream submission/event queue
/// pattern, but events here are fire-and-forget (no correlation id needed
/// beyond what each payload already carries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub msg: EventMsg,
    pub timestamp: OffsetDateTime,
}

impl Event {
    pub fn new(session_id: impl Into<String>, msg: EventMsg) -> Self {
        Self {
            session_id: session_id.into(),
            msg,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
