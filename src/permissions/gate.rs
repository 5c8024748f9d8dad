//! Permission gate
//!
//! Full flow for one tool use:
//! 1. Evaluate (allow / deny / ask / cancelled)
//! 2. On ask, hand the call to the confirmation broker and wait
//! 3. On cancellation, reject every other pending confirmation of the turn

use std::sync::Arc;

use serde_json::Value;

use super::evaluator::{Decision, PermissionEvaluator};
use crate::confirm::{ConfirmationBroker, Resolution};
use crate::core::{GuardError, ToolUseContext};
use crate::tools::{Tool, ToolRegistry};

/// Message returned to the model when the user rejects a tool use
pub const REJECT_MESSAGE: &str =
    "The user doesn't want to proceed with this tool use. The tool use was rejected.";

/// Message returned to the model when a tool use is skipped
pub const SKIP_MESSAGE: &str = "The user skipped this tool use. Continue without it.";

/// Final answer for a tool use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Run the tool
    Allowed,
    /// Do not run the tool; `reason` goes back to the model
    Denied { reason: String },
    /// The turn was cancelled
    Cancelled,
}

/// Evaluator plus broker
pub struct PermissionGate {
    evaluator: Arc<PermissionEvaluator>,
    broker: Arc<ConfirmationBroker>,
}

impl PermissionGate {
    /// Create a gate
    pub fn new(evaluator: Arc<PermissionEvaluator>, broker: Arc<ConfirmationBroker>) -> Self {
        Self { evaluator, broker }
    }

    /// Evaluator in use
    pub fn evaluator(&self) -> &Arc<PermissionEvaluator> {
        &self.evaluator
    }

    /// Broker in use
    pub fn broker(&self) -> &Arc<ConfirmationBroker> {
        &self.broker
    }

    /// Decide on a tool use, asking the user if needed
    pub async fn authorize(
        &self,
        tool: Arc<dyn Tool>,
        input: &Value,
        ctx: &ToolUseContext,
    ) -> GateOutcome {
        let decision = self.evaluator.evaluate(tool.as_ref(), input, ctx).await;

        let analysis = match decision {
            Decision::Allow => {
                tracing::info!("[Gate] Permission allowed for {}", tool.name());
                return GateOutcome::Allowed;
            }
            Decision::Deny { reason } => {
                tracing::info!("[Gate] Permission denied: {}", reason);
                return GateOutcome::Denied { reason };
            }
            Decision::Cancelled => return self.cancelled(ctx),
            Decision::Ask { analysis, .. } => analysis,
        };

        match self.broker.request(tool.clone(), input, ctx, analysis).await {
            Ok(Resolution::Allowed { scope, persist_error }) => {
                if let Some(error) = persist_error {
                    tracing::warn!(
                        "[Gate] {} allowed but its {:?} grant was not saved: {}",
                        tool.name(),
                        scope,
                        error
                    );
                }
                GateOutcome::Allowed
            }
            Ok(Resolution::Rejected) | Ok(Resolution::Aborted) => GateOutcome::Denied {
                reason: REJECT_MESSAGE.to_string(),
            },
            Ok(Resolution::Skipped) => GateOutcome::Denied {
                reason: SKIP_MESSAGE.to_string(),
            },
            Ok(Resolution::Cancelled) | Err(GuardError::Cancelled) => self.cancelled(ctx),
            Err(e) => {
                tracing::error!("[Gate] Could not ask about {}: {}", tool.name(), e);
                GateOutcome::Denied {
                    reason: format!("{}: permission could not be requested ({})", tool.name(), e),
                }
            }
        }
    }

    /// Look the tool up by name, then authorize it
    pub async fn authorize_named(
        &self,
        tools: &ToolRegistry,
        tool_name: &str,
        input: &Value,
        ctx: &ToolUseContext,
    ) -> GateOutcome {
        match tools.get(tool_name) {
            Some(tool) => self.authorize(tool, input, ctx).await,
            None => {
                tracing::warn!("[Gate] Unknown tool {}", tool_name);
                GateOutcome::Denied {
                    reason: format!("{}: unknown tool", tool_name),
                }
            }
        }
    }

    fn cancelled(&self, ctx: &ToolUseContext) -> GateOutcome {
        tracing::debug!("[Gate] Turn {} cancelled", ctx.message_id);
        self.broker.abort_batch(&ctx.message_id);
        GateOutcome::Cancelled
    }
}
