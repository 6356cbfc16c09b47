//! The typed message log that makes up the context window (see
//! `conveyor_core::context`). Defined here, rather than in `core`, because
//! the execution adapters and the tool registry also need to construct and
//! inspect [`ContentPart`]s without depending on the orchestration crate.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

/// Who authored a [`Message`]. Tool turns are modeled as `Assistant` messages
/// whose content is a single [`ContentPart::ToolUse`]; the matching result is
/// carried by the *next* message rather than a third role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a [`Message`]'s content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        payload: Value,
    },
}

impl ContentPart {
    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentPart::ToolUse { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentPart::ToolResult { .. })
    }

    /// The `toolUseId` this part references, if it is a tool result.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    /// The `id` this part allocates, if it is a tool use.
    pub fn tool_use_allocated_id(&self) -> Option<&str> {
        match self {
            ContentPart::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// A single append-only entry in the context window.
///
/// `id` is allocated when the message is pushed and never reused within the
/// lifetime of a session. `last_checkpoint_id` is a borrow of whatever
/// checkpoint was most recently created in the session at the time this
/// message was appended; it is not an owning reference to checkpoint state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentPart>,
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_checkpoint_id: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            created_at: OffsetDateTime::now_utc(),
            last_checkpoint_id: None,
        }
    }

    /// `true` if this message's first content part is a dangling `toolUse`,
    /// i.e. one that has not (yet) been paired with a `toolResult` message.
    pub fn starts_with_tool_use(&self) -> bool {
        self.content.first().is_some_and(ContentPart::is_tool_use)
    }

    pub fn first_tool_use_id(&self) -> Option<&str> {
        self.content.first().and_then(ContentPart::tool_use_allocated_id)
    }

    /// `true` if this message is a single `toolResult` matching `tool_use_id`.
    pub fn is_matching_tool_result(&self, tool_use_id: &str) -> bool {
        self.content.len() == 1
            && matches!(
                self.content.first(),
                Some(ContentPart::ToolResult { tool_use_id: id, .. }) if id == tool_use_id
            )
    }
}
