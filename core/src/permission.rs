//! The permission gate (C7): at-most-once user consent per sensitive tool
//! call, with fast-edit and danger overrides. Adapted from the
//! `SafetyCheck` tri-state in `codex-rs/core/src/safety.rs`, collapsed to
//! the binary grant/ask decision table spec.md §4.7 mandates (this runtime
//! has no sandbox escalation path to model as a third state).

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_protocol::ToolCategory;
use conveyor_protocol::ToolDescriptor;
use serde_json::Value;

/// Asks a human (or a scripted test double) whether a tool call may
/// proceed. Implemented by the CLI's terminal prompt in production.
#[async_trait]
pub trait PermissionUiHandler: Send + Sync {
    async fn ask(&self, descriptor: Option<&ToolDescriptor>, tool_id: &str, args: &Value) -> bool;
}

/// A UI handler that always grants or always denies, for tests and
/// non-interactive (`--danger`-style) runs that still want the gate's
/// bookkeeping.
pub struct FixedUiHandler(pub bool);

#[async_trait]
impl PermissionUiHandler for FixedUiHandler {
    async fn ask(&self, _descriptor: Option<&ToolDescriptor>, _tool_id: &str, _args: &Value) -> bool {
        self.0
    }
}

pub struct PermissionGate {
    fast_edit_mode: AtomicBool,
    danger_mode: AtomicBool,
    ui_handler: Arc<dyn PermissionUiHandler>,
}

impl PermissionGate {
    pub fn new(ui_handler: Arc<dyn PermissionUiHandler>) -> Self {
        Self {
            fast_edit_mode: AtomicBool::new(false),
            danger_mode: AtomicBool::new(false),
            ui_handler,
        }
    }

    pub fn set_fast_edit_mode(&self, on: bool) {
        self.fast_edit_mode.store(on, Ordering::SeqCst);
    }

    /// Opt-in only; callers flip this explicitly, never inferred.
    pub fn set_danger_mode(&self, on: bool) {
        self.danger_mode.store(on, Ordering::SeqCst);
    }

    pub fn danger_mode(&self) -> bool {
        self.danger_mode.load(Ordering::SeqCst)
    }

    /// The decision table of spec.md §4.7, without asking the UI. Used by
    /// callers that want to pre-compute consent status (e.g. to render a
    /// "will ask" badge) without side effects.
    pub fn should_require_permission(&self, descriptor: Option<&ToolDescriptor>) -> bool {
        if self.danger_mode() {
            return false;
        }
        let Some(descriptor) = descriptor else {
            return true;
        };
        if descriptor.always_require_permission {
            return true;
        }
        if self.fast_edit_mode.load(Ordering::SeqCst) && descriptor.category == ToolCategory::FileOp {
            return false;
        }
        if !descriptor.requires_permission {
            return false;
        }
        true
    }

    /// Resolve whether `tool_id` may be invoked with `args`, consulting the
    /// UI handler only when the table says to ask.
    pub async fn request_permission(&self, descriptor: Option<&ToolDescriptor>, tool_id: &str, args: &Value) -> bool {
        if !self.should_require_permission(descriptor) {
            return true;
        }
        self.ui_handler.ask(descriptor, tool_id, args).await
    }
}
