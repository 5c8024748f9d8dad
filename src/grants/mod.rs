//! User grant persistence
//!
//! Keys come from [`permission_key`]; the same function serves the check and
//! save paths. Grants live in one of three scopes, see [`GrantScope`].

mod key;
mod store;

pub use key::{permission_key, shell_command_key};
pub use store::{GrantRecord, GrantScope, GrantSnapshot, GrantSource, GrantStore};
