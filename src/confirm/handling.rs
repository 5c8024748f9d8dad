//! Automatic answers for undecided tool uses

use serde::{Deserialize, Serialize};

use super::request::UserAction;

/// What to do, without prompting, when a tool use would need confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultAction {
    /// Grant the exact invocation for this session
    GrantSession,
    /// Grant the exact invocation in the project grant file
    GrantProject,
    /// Grant the exact invocation once
    GrantOnce,
    /// Reject the call
    Reject,
    /// Skip the call without rejecting the turn
    Skip,
}

impl DefaultAction {
    /// The user action this default stands in for
    pub fn as_user_action(self) -> UserAction {
        match self {
            DefaultAction::GrantSession => UserAction::AllowSession,
            DefaultAction::GrantProject => UserAction::AllowProject,
            DefaultAction::GrantOnce => UserAction::AllowOnce,
            DefaultAction::Reject => UserAction::Reject,
            DefaultAction::Skip => UserAction::Skip,
        }
    }
}

/// Permission handling preferences
///
/// The boolean flags control which extra choices the prompt offers;
/// `default_action` answers every prompt automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionHandling {
    /// Offer "allow for this session" on shell prompts
    #[serde(default)]
    pub grant_session: bool,
    /// Offer "skip" on prompts
    #[serde(default)]
    pub skip: bool,
    /// Automatic answer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<DefaultAction>,
}

impl PermissionHandling {
    /// Handling that answers every prompt with `action`
    pub fn auto(action: DefaultAction) -> Self {
        Self {
            default_action: Some(action),
            ..Self::default()
        }
    }

    /// Offer the session-grant choice
    pub fn with_grant_session(mut self, enabled: bool) -> Self {
        self.grant_session = enabled;
        self
    }

    /// Offer the skip choice
    pub fn with_skip(mut self, enabled: bool) -> Self {
        self.skip = enabled;
        self
    }

    /// Automatic answer, if configured
    pub fn auto_action(&self) -> Option<UserAction> {
        self.default_action.map(DefaultAction::as_user_action)
    }
}
