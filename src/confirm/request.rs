//! Pending confirmations and the user's answers
//!
//! A `ToolUseConfirm` is the record handed to the UI. It resolves exactly
//! once: the first `resolve` removes it from the shared pending map and every
//! later call fails with `AlreadyResolved`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::handling::PermissionHandling;
use crate::command::{generate_command_prefixes, is_unsafe_compound_command, CommandAnalysis};
use crate::core::{GuardError, GuardResult};
use crate::grants::GrantScope;
use crate::tools::{command_of, Tool, ToolKind};

/// The user's answer to a confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserAction {
    /// Allow this call only
    AllowOnce,
    /// Allow the exact invocation for this session
    AllowSession,
    /// Allow the exact invocation and remember it in the project
    AllowProject,
    /// Allow and remember every command starting with `prefix`
    AllowPrefix { prefix: String },
    /// Deny this call
    Reject,
    /// Deny this call and every other pending call of the same turn
    Abort,
    /// Skip this call without stopping the turn
    Skip,
}

/// Terminal outcome of a confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The call may run. `persist_error` is set when saving the grant failed.
    Allowed {
        scope: GrantScope,
        persist_error: Option<String>,
    },
    /// The user rejected the call, or a sibling confirmation aborted the turn
    Rejected,
    /// The user aborted the turn from this confirmation
    Aborted,
    /// The call was skipped
    Skipped,
    /// The turn was cancelled before an answer arrived
    Cancelled,
}

impl Resolution {
    /// Whether the call may run
    pub fn is_allowed(&self) -> bool {
        matches!(self, Resolution::Allowed { .. })
    }
}

pub(crate) struct PendingEntry {
    pub(crate) message_id: String,
    pub(crate) sender: oneshot::Sender<UserAction>,
}

/// Pending confirmations shared between the broker and every handle it gave out
pub(crate) type PendingMap = Arc<Mutex<HashMap<Uuid, PendingEntry>>>;

/// Resolve every entry of `message_id` as rejected; returns how many there were
pub(crate) fn reject_batch(pending: &mut HashMap<Uuid, PendingEntry>, message_id: &str) -> usize {
    let ids: Vec<Uuid> = pending
        .iter()
        .filter(|(_, entry)| entry.message_id == message_id)
        .map(|(id, _)| *id)
        .collect();

    for id in &ids {
        if let Some(entry) = pending.remove(id) {
            let _ = entry.sender.send(UserAction::Reject);
        }
    }
    ids.len()
}

/// A tool use waiting for the user
pub struct ToolUseConfirm {
    /// Unique id of this confirmation
    pub id: Uuid,
    /// Assistant message (turn) the tool use belongs to
    pub message_id: String,
    /// Tool being invoked
    pub tool: Arc<dyn Tool>,
    /// Tool input
    pub input: Value,
    /// Human-readable description of the call
    pub description: String,
    /// Analysis of the shell command, for shell tools
    pub command_prefix: Option<CommandAnalysis>,
    pub(crate) pending: PendingMap,
    pub(crate) cancel: CancellationToken,
}

impl fmt::Debug for ToolUseConfirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolUseConfirm")
            .field("id", &self.id)
            .field("message_id", &self.message_id)
            .field("tool", &self.tool.name())
            .field("input", &self.input)
            .field("description", &self.description)
            .field("command_prefix", &self.command_prefix)
            .finish()
    }
}

impl ToolUseConfirm {
    /// Name of the tool
    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    /// The shell command, for shell tools
    pub fn command(&self) -> Option<&str> {
        match self.tool.kind() {
            ToolKind::Shell => command_of(&self.input),
            _ => None,
        }
    }

    /// Analyzer prefix, unless injection was detected
    pub fn prefix(&self) -> Option<&str> {
        self.command_prefix
            .as_ref()
            .filter(|a| !a.injection_detected())
            .and_then(|a| a.prefix())
    }

    /// Whether this confirmation is still waiting
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(&self.id))
            .unwrap_or(false)
    }

    /// Answer the prompt.
    ///
    /// `Abort` also rejects every other pending confirmation of the same turn
    /// and then cancels the turn.
    pub fn resolve(&self, action: UserAction) -> GuardResult<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| GuardError::other("pending confirmations lock poisoned"))?;
        let entry = pending.remove(&self.id).ok_or(GuardError::AlreadyResolved)?;

        let abort = action == UserAction::Abort;
        // A dropped receiver means the caller was cancelled meanwhile
        let _ = entry.sender.send(action);

        if abort {
            let rejected = reject_batch(&mut pending, &self.message_id);
            drop(pending);
            tracing::info!(
                "[Broker] {} aborted; rejected {} sibling confirmation(s)",
                self.tool.name(),
                rejected
            );
            self.cancel.cancel();
        }
        Ok(())
    }

    /// Allow this call once
    pub fn allow_once(&self) -> GuardResult<()> {
        self.resolve(UserAction::AllowOnce)
    }

    /// Reject this call
    pub fn reject(&self) -> GuardResult<()> {
        self.resolve(UserAction::Reject)
    }

    /// Abort the whole turn
    pub fn abort(&self) -> GuardResult<()> {
        self.resolve(UserAction::Abort)
    }

    /// Choices to present for this confirmation
    pub fn options(&self, handling: &PermissionHandling) -> Vec<PromptOption> {
        prompt_options(self, handling)
    }
}

/// One selectable choice in a confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptOption {
    /// Text shown to the user
    pub label: String,
    /// Answer sent when selected
    pub action: UserAction,
}

impl PromptOption {
    fn new(label: impl Into<String>, action: UserAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Build the choice list for a confirmation.
///
/// "Don't ask again" choices for shell commands are only offered when the
/// command is not an unsafe compound and no injection was detected. The
/// analyzer prefix comes first, then every shorter grantable prefix.
pub fn prompt_options(confirm: &ToolUseConfirm, handling: &PermissionHandling) -> Vec<PromptOption> {
    let mut options = vec![PromptOption::new("Yes", UserAction::AllowOnce)];

    match (confirm.tool.kind(), confirm.command()) {
        (ToolKind::Shell, Some(command)) => {
            let rememberable = !is_unsafe_compound_command(command)
                && confirm
                    .command_prefix
                    .as_ref()
                    .is_some_and(|a| !a.injection_detected());

            if rememberable {
                let prefix = confirm.prefix();
                match prefix {
                    Some(prefix) => options.push(PromptOption::new(
                        format!("Yes, and don't ask again for {} commands", prefix),
                        UserAction::AllowPrefix {
                            prefix: prefix.to_string(),
                        },
                    )),
                    None => options.push(PromptOption::new(
                        format!("Yes, and don't ask again for {}", command),
                        UserAction::AllowProject,
                    )),
                }

                for candidate in generate_command_prefixes(command) {
                    if candidate == command || Some(candidate.as_str()) == prefix {
                        continue;
                    }
                    options.push(PromptOption::new(
                        format!("Yes, and don't ask again for {}:* commands", candidate),
                        UserAction::AllowPrefix { prefix: candidate },
                    ));
                }
            }

            if handling.grant_session {
                options.push(PromptOption::new(
                    "Yes, for this session",
                    UserAction::AllowSession,
                ));
            }
        }
        (ToolKind::FileMutation, _) => {
            options.push(PromptOption::new(
                "Yes, for this session",
                UserAction::AllowSession,
            ));
        }
        _ => {
            options.push(PromptOption::new(
                "Yes, for this session",
                UserAction::AllowSession,
            ));
            options.push(PromptOption::new(
                format!("Yes, and don't ask again for {}", confirm.tool_name()),
                UserAction::AllowProject,
            ));
        }
    }

    if handling.skip {
        options.push(PromptOption::new("Skip", UserAction::Skip));
    }
    options.push(PromptOption::new(
        "No, and tell the assistant what to do differently (esc)",
        UserAction::Reject,
    ));
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPrefix;
    use crate::tools::{BashTool, EditTool, ReadTool};
    use serde_json::json;

    fn confirm_for(
        tool: Arc<dyn Tool>,
        input: Value,
        analysis: Option<CommandAnalysis>,
    ) -> (ToolUseConfirm, oneshot::Receiver<UserAction>) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        pending.lock().unwrap().insert(
            id,
            PendingEntry {
                message_id: "msg-1".into(),
                sender: tx,
            },
        );
        let confirm = ToolUseConfirm {
            id,
            message_id: "msg-1".into(),
            tool,
            input,
            description: "test".into(),
            command_prefix: analysis,
            pending,
            cancel: CancellationToken::new(),
        };
        (confirm, rx)
    }

    fn analysis(prefix: &str) -> CommandAnalysis {
        CommandAnalysis {
            command_prefix: CommandPrefix::new(prefix),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolves_exactly_once() {
        let (confirm, rx) = confirm_for(Arc::new(ReadTool), json!({}), None);

        confirm.allow_once().unwrap();
        assert!(matches!(confirm.reject(), Err(GuardError::AlreadyResolved)));
        assert!(!confirm.is_pending());
        assert_eq!(rx.await.unwrap(), UserAction::AllowOnce);
    }

    #[test]
    fn test_user_action_wire_format() {
        let action: UserAction =
            serde_json::from_str(r#"{"type": "allow_prefix", "prefix": "git"}"#).unwrap();
        assert_eq!(action, UserAction::AllowPrefix { prefix: "git".into() });
        assert_eq!(
            serde_json::to_string(&UserAction::Abort).unwrap(),
            r#"{"type":"abort"}"#
        );
    }

    #[test]
    fn test_shell_options_offer_prefixes() {
        let (confirm, _rx) = confirm_for(
            Arc::new(BashTool),
            json!({"command": "git commit -m fix"}),
            Some(analysis("git commit")),
        );

        let actions: Vec<UserAction> = prompt_options(&confirm, &PermissionHandling::default())
            .into_iter()
            .map(|o| o.action)
            .collect();

        assert_eq!(
            actions,
            vec![
                UserAction::AllowOnce,
                UserAction::AllowPrefix { prefix: "git commit".into() },
                UserAction::AllowPrefix { prefix: "git".into() },
                UserAction::Reject,
            ]
        );
    }

    #[test]
    fn test_unsafe_commands_cannot_be_remembered() {
        let (compound, _rx) = confirm_for(
            Arc::new(BashTool),
            json!({"command": "ls && rm -rf build"}),
            Some(analysis("ls")),
        );
        let (injected, _rx2) = confirm_for(
            Arc::new(BashTool),
            json!({"command": "echo hi"}),
            Some(CommandAnalysis {
                command_prefix: CommandPrefix::injection(),
                ..Default::default()
            }),
        );

        for confirm in [compound, injected] {
            let actions: Vec<UserAction> = prompt_options(&confirm, &PermissionHandling::default())
                .into_iter()
                .map(|o| o.action)
                .collect();
            assert_eq!(actions, vec![UserAction::AllowOnce, UserAction::Reject]);
        }
    }

    #[test]
    fn test_no_prefix_offers_exact() {
        let (confirm, _rx) = confirm_for(
            Arc::new(BashTool),
            json!({"command": "make"}),
            Some(CommandAnalysis::undetermined()),
        );
        let options = prompt_options(&confirm, &PermissionHandling::default().with_skip(true));

        assert_eq!(options[1].action, UserAction::AllowProject);
        assert_eq!(options[1].label, "Yes, and don't ask again for make");
        assert!(options.iter().any(|o| o.action == UserAction::Skip));
    }

    #[test]
    fn test_file_mutation_options_stay_in_session() {
        let (confirm, _rx) = confirm_for(Arc::new(EditTool), json!({"file_path": "a"}), None);
        let actions: Vec<UserAction> = confirm
            .options(&PermissionHandling::default())
            .into_iter()
            .map(|o| o.action)
            .collect();

        assert!(!actions.contains(&UserAction::AllowProject));
        assert!(actions.contains(&UserAction::AllowSession));
    }
}
