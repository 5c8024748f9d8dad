//! Shell command authorization
//!
//! Order of checks:
//! 1. Read-only commands in `SAFE_COMMANDS` are allowed outright
//! 2. Every sub-command goes through the policy; any denial denies
//! 3. An exact grant of the full command allows
//! 4. The analyzer derives prefixes; failure or injection means ask
//! 5. Single commands need a grant or an explicit policy allow;
//!    compound commands need one for every sub-command

use std::collections::HashSet;

use super::evaluator::{Decision, PermissionEvaluator};
use crate::command::{derive_command_prefix, generate_command_prefixes, split_command};
use crate::core::ToolUseContext;
use crate::grants::{shell_command_key, GrantSnapshot};
use crate::tools::Tool;

/// Read-only commands that never need a grant
pub const SAFE_COMMANDS: &[&str] = &[
    "git status",
    "git diff",
    "git log",
    "git branch",
    "pwd",
    "tree",
    "date",
    "which",
];

/// Whether `command` is exactly one of the safe commands
pub fn is_safe_command(command: &str) -> bool {
    SAFE_COMMANDS.contains(&command.trim())
}

/// Exact grant: `Bash(<command>)` or `Bash(<command>:*)`
pub fn has_exact_grant(tool: &dyn Tool, command: &str, grants: &GrantSnapshot) -> bool {
    grants.contains(&shell_command_key(tool, command, None))
        || grants.contains(&shell_command_key(tool, command, Some(command)))
}

/// Whether any grantable prefix of `command` has a `Bash(<prefix>:*)` grant
pub fn has_prefix_grant(tool: &dyn Tool, command: &str, grants: &GrantSnapshot) -> bool {
    generate_command_prefixes(command)
        .iter()
        .any(|prefix| grants.contains(&shell_command_key(tool, prefix, Some(prefix))))
}

/// Exact grant, a grant of a generated prefix, or a grant of the analyzer prefix
pub fn has_command_grant(
    tool: &dyn Tool,
    command: &str,
    prefix: Option<&str>,
    grants: &GrantSnapshot,
) -> bool {
    has_exact_grant(tool, command, grants)
        || has_prefix_grant(tool, command, grants)
        || prefix.is_some_and(|p| grants.contains(&shell_command_key(tool, command, Some(p))))
}

impl PermissionEvaluator {
    /// Sub-commands to authorize, minus the elided `cd`
    fn elide_cd(&self, segments: &[String]) -> Vec<String> {
        segments
            .iter()
            .filter(|sub| self.elided_cd.as_deref() != Some(sub.as_str()))
            .cloned()
            .collect()
    }

    pub(super) async fn authorize_shell(
        &self,
        tool: &dyn Tool,
        command: &str,
        grants: &GrantSnapshot,
        ctx: &ToolUseContext,
    ) -> Decision {
        if is_safe_command(command) {
            tracing::debug!("[Evaluator] '{}' is a safe command", command);
            return Decision::Allow;
        }

        // The compound rule follows the raw split, before any elision
        let segments = split_command(command);
        let compound = segments.len() > 1;
        let sub_commands = self.elide_cd(&segments);

        let mut policy_allowed = HashSet::new();
        for sub in &sub_commands {
            let verdict = self.policy.is_command_allowed(sub).await;
            if ctx.is_cancelled() {
                return Decision::Cancelled;
            }
            if !verdict.allowed {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| "blocked by policy".to_string());
                tracing::info!("[Evaluator] Denied '{}': {}", sub, reason);
                return Decision::deny(tool, format!("'{}' is not allowed: {}", sub, reason));
            }
            if verdict.is_explicit_allow() {
                policy_allowed.insert(sub.as_str());
            }
        }

        if has_exact_grant(tool, command, grants) {
            tracing::debug!("[Evaluator] '{}' has an exact grant", command);
            return Decision::Allow;
        }

        let analysis = match derive_command_prefix(
            self.analyzer.as_ref(),
            command,
            &ctx.cancel,
            self.analyzer_timeout,
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(e) if e.is_cancelled() => {
                tracing::debug!("[Evaluator] Analysis of '{}' cancelled", command);
                return Decision::Cancelled;
            }
            Err(e) => {
                tracing::warn!("[Evaluator] Analysis of '{}' failed: {}", command, e);
                return Decision::ask(tool, None);
            }
        };
        if ctx.is_cancelled() {
            return Decision::Cancelled;
        }

        if analysis.is_undetermined() {
            tracing::debug!("[Evaluator] No prefix for '{}'; asking", command);
            return Decision::ask(tool, Some(analysis));
        }
        if analysis.injection_detected() {
            tracing::info!("[Evaluator] Possible injection in '{}'; asking", command);
            return Decision::ask(tool, Some(analysis));
        }

        let permitted = if !compound {
            has_command_grant(tool, command, analysis.prefix(), grants)
                || sub_commands.iter().any(|sub| policy_allowed.contains(sub.as_str()))
        } else if sub_commands.is_empty() {
            false
        } else {
            sub_commands.iter().all(|sub| {
                match analysis.subcommand_prefixes.get(sub) {
                    Some(entry) if !entry.command_injection_detected => {
                        is_safe_command(sub)
                            || policy_allowed.contains(sub.as_str())
                            || has_command_grant(tool, sub, entry.prefix.as_deref(), grants)
                    }
                    _ => false,
                }
            })
        };

        if permitted {
            Decision::Allow
        } else {
            Decision::ask(tool, Some(analysis))
        }
    }
}
