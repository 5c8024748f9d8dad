//! Layered bash command policy
//!
//! Policy documents live in `.kode/bashPermissions.json` under the project
//! and the home directory. Precedence is project > global > built-in
//! defaults; see [`merge_configs`] for the per-field rules and
//! [`check_command`] for the evaluation order.

mod defaults;
mod document;
mod store;

pub use defaults::{BannedCommands, DEFAULT_BANNED_COMMANDS};
pub use document::{merge_configs, BashPermissionConfig, PrefixPermission, RuleScope};
pub use store::{
    bare_command, check_command, CommandVerdict, PolicyScope, PolicyStore, VerdictSource,
};
