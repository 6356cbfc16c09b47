//! Descriptor and outcome types for tools. The behavior (`validate`,
//! `execute`) lives on a trait in `conveyor_core::tools`; this module only
//! carries the data both the registry and the model client need to agree on.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    FileOp,
    Shell,
    Readonly,
    Network,
}

/// Static metadata describing a tool, independent of any particular
/// invocation. Rendered into the provider-specific tool-call schema by the
/// model client (see `conveyor_core::model`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub requires_permission: bool,
    pub always_require_permission: bool,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
    pub required_parameters: Vec<String>,
}

/// The result of executing a tool. `Ok`/`Err` mirror the taxonomy in
/// §7 of the design notes: a validation or execution failure is carried as
/// `Err` and folded back into the conversation rather than propagated as a
/// Rust error, so the model gets a chance to recover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok {
        data: Value,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        aborted: bool,
    },
    Err {
        message: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        aborted: bool,
    },
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        ToolOutcome::Ok { data, aborted: false }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ToolOutcome::Err {
            message: message.into(),
            aborted: false,
        }
    }

    pub fn aborted() -> Self {
        ToolOutcome::Err {
            message: "aborted".to_string(),
            aborted: true,
        }
    }

    pub fn is_aborted(&self) -> bool {
        match self {
            ToolOutcome::Ok { aborted, .. } | ToolOutcome::Err { aborted, .. } => *aborted,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }

    /// Serialize to the JSON value carried by a `toolResult` content part.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
