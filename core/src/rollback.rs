//! The rollback manager (C11): aborts in-flight work, restores the
//! checkpoint attached to a given message, and trims the context back to
//! that point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use conveyor_exec::CheckpointManager;

use crate::error::CoreError;
use crate::error::Result;
use crate::events::EventBus;
use crate::session::SessionState;

pub struct RollbackManager {
    checkpoints: CheckpointManager,
    event_bus: Arc<EventBus>,
}

impl RollbackManager {
    pub fn new(session_id: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        Self {
            checkpoints: CheckpointManager::new(session_id),
            event_bus,
        }
    }

    /// §4.11: mark the session aborted without an acknowledgement message,
    /// restore every tracked repo to the checkpoint attached to
    /// `message_id`, trim the context back to (and including) that
    /// message, and publish `rollback:completed`.
    pub async fn rollback_session(
        &self,
        session: &Arc<SessionState>,
        message_id: &str,
        repo_roots: &[PathBuf],
    ) -> Result<HashMap<String, String>> {
        session.skip_abort_ack.store(true, std::sync::atomic::Ordering::SeqCst);
        session.request_abort();
        self.event_bus.emit(conveyor_protocol::EventMsg::ProcessingAborted);

        let checkpoint_id = {
            let ctx = session
                .context
                .lock()
                .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
            ctx.messages()
                .iter()
                .find(|m| m.id == message_id)
                .ok_or_else(|| CoreError::Invariant(format!("message {message_id} not found for rollback")))?
                .last_checkpoint_id
                .clone()
        };

        let restored = if let Some(tool_execution_id) = checkpoint_id {
            self.checkpoints.restore_all(repo_roots, &tool_execution_id).await?
        } else {
            HashMap::new()
        };

        {
            let mut ctx = session
                .context
                .lock()
                .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
            ctx.rollback_to_message(message_id)?;
        }

        self.event_bus.emit(conveyor_protocol::EventMsg::RollbackCompleted {
            restored: restored.clone(),
        });
        session.clear_aborted();

        Ok(restored)
    }
}
