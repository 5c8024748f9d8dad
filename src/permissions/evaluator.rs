//! Permission evaluator
//!
//! Decides whether a proposed tool use may run silently, must be denied, or
//! needs the user. Never fails: every path ends in a `Decision`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::command::{CommandAnalysis, CommandAnalyzer};
use crate::core::{GuardConfig, ToolUseContext};
use crate::grants::{permission_key, GrantStore};
use crate::policy::PolicyStore;
use crate::tools::{command_of, Tool, ToolKind};

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run without asking
    Allow,
    /// Refuse; `reason` names the tool
    Deny { reason: String },
    /// The user has to decide; `analysis` is the shell analysis if one ran
    Ask {
        message: String,
        analysis: Option<CommandAnalysis>,
    },
    /// The turn was cancelled while checking
    Cancelled,
}

impl Decision {
    /// Ask about `tool`
    pub fn ask(tool: &dyn Tool, analysis: Option<CommandAnalysis>) -> Self {
        Decision::Ask {
            message: format!(
                "Requested permission to use {}, but it hasn't been granted yet.",
                tool.name()
            ),
            analysis,
        }
    }

    /// Deny `tool` with `reason`
    pub fn deny(tool: &dyn Tool, reason: impl std::fmt::Display) -> Self {
        Decision::Deny {
            reason: format!("{}: {}", tool.name(), reason),
        }
    }

    /// Whether the call may run without asking
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Combines policy, grants and command analysis into a decision
pub struct PermissionEvaluator {
    pub(super) policy: Arc<PolicyStore>,
    pub(super) grants: Arc<GrantStore>,
    pub(super) analyzer: Arc<dyn CommandAnalyzer>,
    pub(super) restricted: bool,
    pub(super) analyzer_timeout: Duration,
    pub(super) elided_cd: Option<String>,
}

impl PermissionEvaluator {
    /// Create an evaluator over the given stores
    pub fn new(
        config: &GuardConfig,
        policy: Arc<PolicyStore>,
        grants: Arc<GrantStore>,
        analyzer: Arc<dyn CommandAnalyzer>,
    ) -> Self {
        Self {
            policy,
            grants,
            analyzer,
            restricted: config.restricted,
            analyzer_timeout: config.analyzer_timeout,
            elided_cd: config.elided_cd_command(),
        }
    }

    /// Policy store in use
    pub fn policy(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    /// Grant store in use
    pub fn grants(&self) -> &Arc<GrantStore> {
        &self.grants
    }

    /// Decide on one tool use.
    ///
    /// Gating is active only when both the configuration and `ctx` are
    /// restricted. Cancellation is checked around every await.
    pub async fn evaluate(&self, tool: &dyn Tool, input: &Value, ctx: &ToolUseContext) -> Decision {
        if !(self.restricted && ctx.restricted) {
            return Decision::Allow;
        }
        if ctx.is_cancelled() {
            return Decision::Cancelled;
        }
        if !tool.needs_permissions(input) {
            return Decision::Allow;
        }

        let snapshot = self.grants.snapshot().await;
        if ctx.is_cancelled() {
            return Decision::Cancelled;
        }

        if tool.kind() == ToolKind::Shell {
            if snapshot.persisted_contains(tool.name()) {
                tracing::debug!(
                    "[Evaluator] {} is granted as a tool; checking the command anyway",
                    tool.name()
                );
            }
            let command = match command_of(input).map(str::trim) {
                Some(command) if !command.is_empty() => command,
                _ => return Decision::deny(tool, "no command given"),
            };
            return self.authorize_shell(tool, command, &snapshot, ctx).await;
        }

        let key = permission_key(tool, input, None);
        match snapshot.find(&key) {
            Some(source) => {
                tracing::debug!("[Evaluator] {} granted by {:?}", key, source);
                Decision::Allow
            }
            None => Decision::ask(tool, None),
        }
    }
}
