//! Confirmation broker
//!
//! Turns an undecided tool use into a prompt for the UI and waits for the
//! answer. Prompts are sent over an mpsc channel; answers come back through
//! a oneshot per confirmation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::handling::PermissionHandling;
use super::request::{reject_batch, PendingEntry, PendingMap, Resolution, ToolUseConfirm, UserAction};
use crate::command::{derive_command_prefix, CommandAnalysis, CommandAnalyzer};
use crate::core::{GuardConfig, GuardError, GuardResult, ToolUseContext};
use crate::grants::{GrantScope, GrantStore};
use crate::tools::{command_of, Tool, ToolKind};

/// Default buffer size for the prompt channel
pub const PROMPT_CHANNEL_SIZE: usize = 32;

/// Sender half of the prompt channel (held by the broker)
pub type PromptSender = mpsc::Sender<ToolUseConfirm>;

/// Receiver half of the prompt channel (held by the UI)
pub type PromptReceiver = mpsc::Receiver<ToolUseConfirm>;

/// Create a new prompt channel pair
pub fn create_prompt_channel() -> (PromptSender, PromptReceiver) {
    mpsc::channel(PROMPT_CHANNEL_SIZE)
}

/// Presents undecided tool uses to the user and applies the answers
pub struct ConfirmationBroker {
    grants: Arc<GrantStore>,
    analyzer: Arc<dyn CommandAnalyzer>,
    analyzer_timeout: Duration,
    handling: PermissionHandling,
    pending: PendingMap,
    prompts: PromptSender,
}

impl ConfirmationBroker {
    /// Create a broker sending prompts on `prompts`
    pub fn new(
        config: &GuardConfig,
        grants: Arc<GrantStore>,
        analyzer: Arc<dyn CommandAnalyzer>,
        prompts: PromptSender,
    ) -> Self {
        Self {
            grants,
            analyzer,
            analyzer_timeout: config.analyzer_timeout,
            handling: config.permission_handling.clone(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            prompts,
        }
    }

    /// Replace the permission handling
    pub fn with_handling(mut self, handling: PermissionHandling) -> Self {
        self.handling = handling;
        self
    }

    /// Current permission handling
    pub fn handling(&self) -> &PermissionHandling {
        &self.handling
    }

    /// Number of confirmations still waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Reject every pending confirmation of `message_id` without prompting
    pub fn abort_batch(&self, message_id: &str) -> usize {
        match self.pending.lock() {
            Ok(mut pending) => {
                let rejected = reject_batch(&mut pending, message_id);
                if rejected > 0 {
                    tracing::info!(
                        "[Broker] Rejected {} pending confirmation(s) for message {}",
                        rejected,
                        message_id
                    );
                }
                rejected
            }
            Err(_) => 0,
        }
    }

    fn forget(&self, id: &Uuid) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }

    /// Build and register a confirmation.
    ///
    /// The description and (for shell tools) the command analysis are
    /// computed concurrently; `known` skips the analysis. Fails with
    /// `Cancelled` if the turn is cancelled meanwhile.
    pub async fn prepare(
        &self,
        tool: Arc<dyn Tool>,
        input: &Value,
        ctx: &ToolUseContext,
        known: Option<CommandAnalysis>,
    ) -> GuardResult<(ToolUseConfirm, oneshot::Receiver<UserAction>)> {
        if ctx.is_cancelled() {
            return Err(GuardError::Cancelled);
        }

        let shell_command = match tool.kind() {
            ToolKind::Shell => command_of(input),
            _ => None,
        };
        let analysis = async {
            match (known, shell_command) {
                (Some(analysis), _) => Ok(Some(analysis)),
                (None, Some(command)) => derive_command_prefix(
                    self.analyzer.as_ref(),
                    command,
                    &ctx.cancel,
                    self.analyzer_timeout,
                )
                .await
                .map(Some),
                (None, None) => Ok(None),
            }
        };

        let (description, analysis) = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(GuardError::Cancelled),
            both = futures::future::join(tool.description(input), analysis) => both,
        };
        let command_prefix = analysis?;

        if ctx.is_cancelled() {
            return Err(GuardError::Cancelled);
        }

        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| GuardError::other("pending confirmations lock poisoned"))?
            .insert(
                id,
                PendingEntry {
                    message_id: ctx.message_id.clone(),
                    sender,
                },
            );

        let confirm = ToolUseConfirm {
            id,
            message_id: ctx.message_id.clone(),
            tool,
            input: input.clone(),
            description,
            command_prefix,
            pending: self.pending.clone(),
            cancel: ctx.cancel.clone(),
        };
        Ok((confirm, receiver))
    }

    /// Ask the user about a tool use and apply the answer.
    ///
    /// A configured default action answers without prompting. Returns
    /// `Err(Cancelled)` if the turn is cancelled before an answer arrives and
    /// `Err(ChannelClosed)` if no UI is listening.
    pub async fn request(
        &self,
        tool: Arc<dyn Tool>,
        input: &Value,
        ctx: &ToolUseContext,
        known: Option<CommandAnalysis>,
    ) -> GuardResult<Resolution> {
        if let Some(action) = self.handling.auto_action() {
            tracing::info!("[Broker] Auto-answering {} with {:?}", tool.name(), action);
            return Ok(self.apply(tool.as_ref(), input, action).await);
        }

        let (confirm, receiver) = self.prepare(tool.clone(), input, ctx, known).await?;
        let id = confirm.id;

        tracing::info!("[Broker] Asking user about {}", tool.name());
        if self.prompts.send(confirm).await.is_err() {
            self.forget(&id);
            return Err(GuardError::ChannelClosed);
        }

        let action = tokio::select! {
            biased;
            answer = receiver => match answer {
                Ok(action) => action,
                Err(_) => {
                    tracing::warn!("[Broker] Confirmation for {} dropped unanswered", tool.name());
                    UserAction::Reject
                }
            },
            _ = ctx.cancel.cancelled() => {
                self.forget(&id);
                tracing::debug!("[Broker] Confirmation for {} cancelled", tool.name());
                return Err(GuardError::Cancelled);
            }
        };

        let grants_access = matches!(
            action,
            UserAction::AllowOnce
                | UserAction::AllowSession
                | UserAction::AllowProject
                | UserAction::AllowPrefix { .. }
        );
        if grants_access && ctx.is_cancelled() {
            return Err(GuardError::Cancelled);
        }

        Ok(self.apply(tool.as_ref(), input, action).await)
    }

    /// Persist the grant an answer implies, then report the outcome.
    ///
    /// A failed save is logged and reported in `persist_error`; the current
    /// call is still allowed.
    async fn apply(&self, tool: &dyn Tool, input: &Value, action: UserAction) -> Resolution {
        let (scope, prefix) = match action {
            UserAction::AllowOnce => (GrantScope::Once, None),
            UserAction::AllowSession => (GrantScope::Session, None),
            UserAction::AllowProject => (GrantScope::Project, None),
            UserAction::AllowPrefix { prefix } => (GrantScope::Project, Some(prefix)),
            UserAction::Reject => {
                tracing::info!("[Broker] User rejected {}", tool.name());
                return Resolution::Rejected;
            }
            UserAction::Abort => return Resolution::Aborted,
            UserAction::Skip => {
                tracing::info!("[Broker] Skipped {}", tool.name());
                return Resolution::Skipped;
            }
        };

        match self.grants.save(tool, input, prefix.as_deref(), scope).await {
            Ok(scope) => Resolution::Allowed {
                scope,
                persist_error: None,
            },
            Err(e) => {
                tracing::error!("[Broker] Failed to save grant for {}: {}", tool.name(), e);
                Resolution::Allowed {
                    scope,
                    persist_error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandPrefix, HeuristicAnalyzer};
    use crate::confirm::DefaultAction;
    use crate::tools::{BashTool, EditTool};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_broker() -> (ConfirmationBroker, PromptReceiver, Arc<GrantStore>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = GuardConfig::new(temp.path()).with_home_dir(temp.path().join("home"));
        let grants = Arc::new(GrantStore::new(&config));
        let (tx, rx) = create_prompt_channel();
        let broker = ConfirmationBroker::new(
            &config,
            grants.clone(),
            Arc::new(HeuristicAnalyzer::new().unwrap()),
            tx,
        );
        (broker, rx, grants, temp)
    }

    #[tokio::test]
    async fn test_allow_prefix_persists_before_returning() {
        let (broker, mut prompts, grants, _temp) = create_test_broker();
        let ctx = ToolUseContext::new("msg-1");
        let input = json!({"command": "git commit -m fix"});

        let ui = tokio::spawn(async move {
            let confirm = prompts.recv().await.unwrap();
            assert_eq!(confirm.prefix(), Some("git commit"));
            confirm
                .resolve(UserAction::AllowPrefix { prefix: "git commit".into() })
                .unwrap();
        });

        let resolution = broker
            .request(Arc::new(BashTool), &input, &ctx, None)
            .await
            .unwrap();
        ui.await.unwrap();

        assert_eq!(
            resolution,
            Resolution::Allowed {
                scope: GrantScope::Project,
                persist_error: None
            }
        );
        assert_eq!(grants.list_approved().await, vec!["Bash(git commit:*)".to_string()]);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_rejects_siblings() {
        let (broker, mut prompts, _grants, _temp) = create_test_broker();
        let broker = Arc::new(broker);
        let ctx = ToolUseContext::new("msg-1");

        let mut calls = Vec::new();
        for command in ["npm test", "npm run lint", "cargo fmt"] {
            let broker = broker.clone();
            let ctx = ctx.clone();
            calls.push(tokio::spawn(async move {
                broker
                    .request(Arc::new(BashTool), &json!({"command": command}), &ctx, None)
                    .await
            }));
        }

        let mut confirms = Vec::new();
        for _ in 0..3 {
            confirms.push(prompts.recv().await.unwrap());
        }
        confirms[1].abort().unwrap();

        let mut outcomes = Vec::new();
        for call in calls {
            outcomes.push(call.await.unwrap().unwrap());
        }

        assert_eq!(
            outcomes.iter().filter(|r| **r == Resolution::Aborted).count(),
            1
        );
        assert_eq!(
            outcomes.iter().filter(|r| **r == Resolution::Rejected).count(),
            2
        );
        assert!(ctx.is_cancelled());
        assert!(confirms.iter().all(|c| !c.is_pending()));
        assert!(matches!(confirms[0].allow_once(), Err(GuardError::AlreadyResolved)));
    }

    #[tokio::test]
    async fn test_abort_leaves_other_turns_alone() {
        let (broker, _prompts, _grants, _temp) = create_test_broker();
        let (first, _rx1) = broker
            .prepare(Arc::new(EditTool), &json!({}), &ToolUseContext::new("msg-1"), None)
            .await
            .unwrap();
        let (second, _rx2) = broker
            .prepare(Arc::new(EditTool), &json!({}), &ToolUseContext::new("msg-2"), None)
            .await
            .unwrap();

        first.abort().unwrap();

        assert!(second.is_pending());
        assert_eq!(broker.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let (broker, mut prompts, _grants, _temp) = create_test_broker();
        let ctx = ToolUseContext::new("msg-1");
        let cancel = ctx.cancel.clone();

        let ui = tokio::spawn(async move {
            let confirm = prompts.recv().await.unwrap();
            cancel.cancel();
            confirm
        });

        let result = broker
            .request(Arc::new(BashTool), &json!({"command": "ls"}), &ctx, None)
            .await;
        let confirm = ui.await.unwrap();

        assert!(matches!(result, Err(GuardError::Cancelled)));
        assert!(!confirm.is_pending());
    }

    #[tokio::test]
    async fn test_prepare_uses_known_analysis() {
        let (broker, _prompts, _grants, _temp) = create_test_broker();
        let known = CommandAnalysis {
            command_prefix: CommandPrefix::new("docker compose"),
            ..Default::default()
        };

        let (confirm, _rx) = broker
            .prepare(
                Arc::new(BashTool),
                &json!({"command": "docker compose up", "description": "Start services"}),
                &ToolUseContext::new("msg-1"),
                Some(known),
            )
            .await
            .unwrap();

        assert_eq!(confirm.prefix(), Some("docker compose"));
        assert_eq!(confirm.description, "Start services");
    }

    #[tokio::test]
    async fn test_auto_grant_without_prompt() {
        let (broker, mut prompts, grants, _temp) = create_test_broker();
        let broker = broker.with_handling(PermissionHandling::auto(DefaultAction::GrantSession));

        let resolution = broker
            .request(
                Arc::new(BashTool),
                &json!({"command": "make build"}),
                &ToolUseContext::new("msg-1"),
                None,
            )
            .await
            .unwrap();

        assert!(resolution.is_allowed());
        assert!(grants.is_granted("Bash(make build)").await);
        assert!(prompts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persist_failure_still_allows() {
        let temp = TempDir::new().unwrap();
        // A file where the .kode directory should be makes every write fail
        std::fs::write(temp.path().join(".kode"), "not a dir").unwrap();
        let config = GuardConfig::new(temp.path()).with_home_dir(temp.path().join("home"));
        let (tx, _rx) = create_prompt_channel();
        let broker = ConfirmationBroker::new(
            &config,
            Arc::new(GrantStore::new(&config)),
            Arc::new(HeuristicAnalyzer::new().unwrap()),
            tx,
        )
        .with_handling(PermissionHandling::auto(DefaultAction::GrantProject));

        let resolution = broker
            .request(
                Arc::new(BashTool),
                &json!({"command": "make build"}),
                &ToolUseContext::new("msg-1"),
                None,
            )
            .await
            .unwrap();

        match resolution {
            Resolution::Allowed { scope, persist_error } => {
                assert_eq!(scope, GrantScope::Project);
                assert!(persist_error.is_some());
            }
            other => panic!("expected Allowed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (broker, prompts, _grants, _temp) = create_test_broker();
        drop(prompts);

        let result = broker
            .request(Arc::new(EditTool), &json!({}), &ToolUseContext::new("msg-1"), None)
            .await;

        assert!(matches!(result, Err(GuardError::ChannelClosed)));
        assert_eq!(broker.pending_count(), 0);
    }
}
