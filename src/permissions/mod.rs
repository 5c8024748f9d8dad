//! Permission evaluation for tool uses
//!
//! This module provides:
//! - `PermissionEvaluator` - Allow / deny / ask decision for one tool use
//! - `Decision` - The evaluator's outcome
//! - Shell command authorization (safe set, policy, grants, prefixes)
//! - `PermissionGate` - Evaluator plus confirmation broker
//!
//! ## Example
//!
//! ```rust,ignore
//! use shadow_guard::permissions::{Decision, PermissionEvaluator};
//!
//! match evaluator.evaluate(&BashTool, &json!({"command": "ls"}), &ctx).await {
//!     Decision::Allow => { /* run */ }
//!     Decision::Deny { reason } => { /* report */ }
//!     Decision::Ask { .. } => { /* prompt */ }
//!     Decision::Cancelled => { /* stop the turn */ }
//! }
//! ```

mod evaluator;
mod gate;
mod shell;

pub use evaluator::{Decision, PermissionEvaluator};
pub use gate::{GateOutcome, PermissionGate, REJECT_MESSAGE, SKIP_MESSAGE};
pub use shell::{
    has_command_grant, has_exact_grant, has_prefix_grant, is_safe_command, SAFE_COMMANDS,
};
