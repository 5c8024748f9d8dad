//! Interactive confirmation of tool uses
//!
//! This module provides:
//! - `ConfirmationBroker` - Sends prompts to the UI and applies the answers
//! - `ToolUseConfirm` - One-shot record handed to the UI
//! - `UserAction` / `Resolution` - Answers and terminal outcomes
//! - `PermissionHandling` - Automatic answers and extra prompt choices
//! - `prompt_options` - The choice list for a prompt

mod broker;
mod handling;
mod request;

pub use broker::{
    create_prompt_channel, ConfirmationBroker, PromptReceiver, PromptSender, PROMPT_CHANNEL_SIZE,
};
pub use handling::{DefaultAction, PermissionHandling};
pub use request::{prompt_options, PromptOption, Resolution, ToolUseConfirm, UserAction};
