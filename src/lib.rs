pub mod core;
pub mod tools;

// Shell command parsing and prefix analysis
pub mod command;

// Bash policy documents (project + global)
pub mod policy;

// Once / session / project grants
pub mod grants;

// Allow / deny / ask decisions
pub mod permissions;

// Interactive confirmation and abort fan-out
pub mod confirm;

pub mod logging;
