//! Per-session mutable state (§3 Session State): owns the context window,
//! the cancellation token, and the backend handles a running session needs.
//! Created by the agent factory at session start, mutated only by the FSM
//! driver and the rollback manager under cooperative scheduling.

use std::sync::Arc;
use std::sync::Mutex;

use conveyor_exec::CancelSignal;
use conveyor_exec::ExecutionAdapter;

use crate::context::ContextWindow;

/// Multi-repo bookkeeping, populated lazily once a session actually touches
/// more than one repository root.
#[derive(Debug, Default)]
pub struct MultiRepoState {
    pub repo_paths: Vec<String>,
    pub structure_generated: bool,
    pub last_checkpoint_meta: Option<String>,
}

pub struct SessionState {
    pub id: String,
    pub context: Mutex<ContextWindow>,
    pub execution_adapter: Arc<dyn ExecutionAdapter>,
    abort_signal: Mutex<CancelSignal>,
    aborted: std::sync::atomic::AtomicBool,
    pub skip_abort_ack: std::sync::atomic::AtomicBool,
    pub token_usage: Mutex<Option<TokenUsage>>,
    pub llm_api_key: Option<String>,
    pub caching_enabled: bool,
    pub multi_repo: Mutex<Option<MultiRepoState>>,
    /// Cumulative failures surfaced to the model per spec.md §7 item 3.
    pub last_tool_error: Mutex<Option<String>>,
    pub iteration: std::sync::atomic::AtomicU32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl SessionState {
    pub fn new(id: impl Into<String>, execution_adapter: Arc<dyn ExecutionAdapter>, caching_enabled: bool) -> Self {
        Self {
            id: id.into(),
            context: Mutex::new(ContextWindow::new()),
            execution_adapter,
            abort_signal: Mutex::new(CancelSignal::new()),
            aborted: std::sync::atomic::AtomicBool::new(false),
            skip_abort_ack: std::sync::atomic::AtomicBool::new(false),
            token_usage: Mutex::new(None),
            llm_api_key: None,
            caching_enabled,
            multi_repo: Mutex::new(None),
            last_tool_error: Mutex::new(None),
            iteration: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn abort_signal(&self) -> CancelSignal {
        self.abort_signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Set by the session when the caller requests cancellation. Cancels
    /// the shared token (so in-flight adapter/model calls unblock) and
    /// flips the flag the driver polls at every suspension point.
    pub fn request_abort(&self) {
        self.aborted.store(true, std::sync::atomic::Ordering::SeqCst);
        self.abort_signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner).cancel();
    }

    /// Clear the aborted flag and re-arm the cancellation token once the
    /// driver has fully processed an abort, so a subsequent query can
    /// proceed. `CancellationToken` cannot be un-cancelled, so re-arming
    /// means swapping in a fresh token rather than resetting the old one;
    /// any clone handed out via `abort_signal()` before this call stays
    /// cancelled, which is correct since it belonged to the aborted turn.
    pub fn clear_aborted(&self) {
        self.aborted.store(false, std::sync::atomic::Ordering::SeqCst);
        self.skip_abort_ack.store(false, std::sync::atomic::Ordering::SeqCst);
        *self.abort_signal.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = CancelSignal::new();
    }

    pub fn record_tool_error(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.last_tool_error.lock() {
            *slot = Some(message.into());
        }
    }

    pub fn repo_roots(&self) -> Vec<String> {
        self.multi_repo
            .lock()
            .ok()
            .and_then(|m| m.as_ref().map(|m| m.repo_paths.clone()))
            .unwrap_or_default()
    }
}
