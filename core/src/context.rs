//! The context window (C1): an append-only typed message log with the I-1
//! ordering invariant and rollback-to-message semantics.

use std::collections::HashSet;

use conveyor_protocol::ContentPart;
use conveyor_protocol::Message;
use conveyor_protocol::Role;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::error::Result;

/// Append-only message log plus the read-file tracking and checkpoint
/// bookkeeping described in spec.md §4.1.
#[derive(Debug, Default)]
pub struct ContextWindow {
    messages: Vec<Message>,
    read_files: HashSet<String>,
    last_checkpoint_id: Option<String>,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl ContextWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn peek(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_checkpoint_id(&self) -> Option<&str> {
        self.last_checkpoint_id.as_deref()
    }

    pub fn set_last_checkpoint_id(&mut self, id: impl Into<String>) {
        self.last_checkpoint_id = Some(id.into());
    }

    pub fn has_read_file(&self, path: &str) -> bool {
        self.read_files.contains(path)
    }

    pub fn record_file_read(&mut self, path: impl Into<String>) {
        self.read_files.insert(path.into());
    }

    /// Append a previously-persisted message verbatim (used by the CLI's
    /// `--resume` path to rehydrate a session store file). Unlike `push*`,
    /// this keeps the message's original id and `lastCheckpointId` rather
    /// than allocating new ones, and updates `last_checkpoint_id` from it
    /// so a subsequent rollback still has the right anchor.
    pub fn restore_message(&mut self, message: Message) {
        if let Some(checkpoint_id) = &message.last_checkpoint_id {
            self.last_checkpoint_id = Some(checkpoint_id.clone());
        }
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> Result<String> {
        if self.messages.is_empty() {
            // I-2: the first message of the conversation must be a user
            // message; this is always the case along this path since we
            // only ever construct it here.
        }
        self.push(Role::User, vec![ContentPart::Text(text.into())])
    }

    pub fn push_assistant_blocks(&mut self, parts: Vec<ContentPart>) -> Result<String> {
        self.push(Role::Assistant, parts)
    }

    pub fn push_tool_use(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: Map<String, Value>,
    ) -> Result<String> {
        let id = id.into();
        self.push(
            Role::Assistant,
            vec![ContentPart::ToolUse {
                id,
                name: name.into(),
                input,
            }],
        )
    }

    pub fn push_tool_result(&mut self, tool_use_id: impl Into<String>, payload: Value) -> Result<String> {
        self.push(
            Role::User,
            vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                payload,
            }],
        )
    }

    fn push(&mut self, role: Role, content: Vec<ContentPart>) -> Result<String> {
        let id = new_message_id();
        let mut message = Message::new(id.clone(), role, content);
        message.last_checkpoint_id = self.last_checkpoint_id.clone();
        self.messages.push(message);
        self.check_invariant()?;
        Ok(id)
    }

    /// I-1: a `toolUse`-leading message must be immediately followed by its
    /// matching `toolResult`, except for a trailing dangling `toolUse` (a
    /// tool call that hasn't resolved yet).
    fn check_invariant(&self) -> Result<()> {
        for window in self.messages.windows(2) {
            let (first, second) = (&window[0], &window[1]);
            if let Some(tool_use_id) = first.first_tool_use_id()
                && first.starts_with_tool_use()
                && !second.is_matching_tool_result(tool_use_id)
            {
                return Err(CoreError::Invariant(format!(
                    "message {} (toolUse {tool_use_id}) is not immediately followed by its toolResult",
                    first.id
                )));
            }
        }
        if let Some(first) = self.messages.first()
            && first.role != Role::User
        {
            return Err(CoreError::Invariant(
                "first message of the conversation must have role user".to_string(),
            ));
        }
        Ok(())
    }

    /// I-2, checked once at session start rather than per-push since only
    /// the very first push can violate it.
    pub fn assert_starts_with_user(&self) -> Result<()> {
        match self.messages.first() {
            Some(m) if m.role == Role::User => Ok(()),
            Some(_) => Err(CoreError::Invariant(
                "first message of the conversation must have role user".to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Does this context currently end in a dangling `toolUse` awaiting its
    /// result? Used by the driver's abort handling to know whether a
    /// synthetic `toolResult` must be synthesized.
    pub fn dangling_tool_use_id(&self) -> Option<&str> {
        self.messages.last().filter(|m| m.starts_with_tool_use()).and_then(Message::first_tool_use_id)
    }

    /// Remove every message at index `[0..=k]` where `k` is the index of
    /// `message_id`, per P5. Rewrites `last_checkpoint_id` from the newest
    /// remaining message, or clears it if the context is now empty.
    pub fn rollback_to_message(&mut self, message_id: &str) -> Result<usize> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| CoreError::Invariant(format!("message {message_id} not found for rollback")))?;

        let removed = idx + 1;
        self.messages.drain(0..removed);
        self.last_checkpoint_id = self.messages.last().and_then(|m| m.last_checkpoint_id.clone());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_user_then_final_roundtrips() {
        let mut ctx = ContextWindow::new();
        ctx.push_user("hi").expect("push user");
        ctx.push_assistant_blocks(vec![ContentPart::Text("hello".to_string())])
            .expect("push assistant");
        assert_eq!(ctx.messages().len(), 2);
    }

    #[test]
    fn tool_use_without_result_is_allowed_when_trailing() {
        let mut ctx = ContextWindow::new();
        ctx.push_user("hi").expect("push user");
        ctx.push_tool_use("tu-1", "bash", Map::new()).expect("dangling toolUse is ok");
        assert_eq!(ctx.dangling_tool_use_id(), Some("tu-1"));
    }

    #[test]
    fn mismatched_tool_result_violates_invariant() {
        let mut ctx = ContextWindow::new();
        ctx.push_user("hi").expect("push user");
        ctx.push_tool_use("tu-1", "bash", Map::new()).expect("push toolUse");
        let err = ctx.push_tool_result("tu-WRONG", json!({"ok": true}));
        assert!(err.is_err());
    }

    #[test]
    fn rollback_trims_prefix_and_rewrites_checkpoint_id() {
        let mut ctx = ContextWindow::new();
        let m1 = ctx.push_user("hi").expect("push user");
        ctx.set_last_checkpoint_id("chkpt-1");
        let m2 = ctx
            .push_assistant_blocks(vec![ContentPart::Text("ok".to_string())])
            .expect("push assistant");
        let _ = m1;

        let removed = ctx.rollback_to_message(&m2).expect("rollback");
        assert_eq!(removed, 2);
        assert!(ctx.is_empty());
        assert_eq!(ctx.last_checkpoint_id(), None);
    }

    #[test]
    fn restore_message_rehydrates_a_persisted_message_verbatim() {
        let mut ctx = ContextWindow::new();
        let mut restored = Message::new("m-1", Role::User, vec![ContentPart::Text("hi".to_string())]);
        restored.last_checkpoint_id = Some("chkpt-9".to_string());

        ctx.restore_message(restored);

        assert_eq!(ctx.messages().len(), 1);
        assert_eq!(ctx.messages()[0].id, "m-1");
        assert_eq!(ctx.last_checkpoint_id(), Some("chkpt-9"));
    }

    #[test]
    fn read_file_tracking_round_trips() {
        let mut ctx = ContextWindow::new();
        assert!(!ctx.has_read_file("x.txt"));
        ctx.record_file_read("x.txt");
        assert!(ctx.has_read_file("x.txt"));
    }
}
