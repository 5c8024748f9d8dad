//! Per-call context handed to the evaluator

use tokio_util::sync::CancellationToken;

/// Context for a single tool-use permission check
///
/// All checks issued for one assistant message share the same `message_id`
/// and the same cancellation token. Cancelling the token stops every pending
/// check of that turn.
#[derive(Debug, Clone)]
pub struct ToolUseContext {
    /// Id of the assistant message that requested the tool use
    pub message_id: String,
    /// Whether gating is active for this call
    pub restricted: bool,
    /// Cancellation for the whole turn
    pub cancel: CancellationToken,
}

impl ToolUseContext {
    /// Create a restricted context with a fresh cancellation token
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            restricted: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Set whether gating is active
    pub fn with_restricted(mut self, restricted: bool) -> Self {
        self.restricted = restricted;
        self
    }

    /// Share an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the turn has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
