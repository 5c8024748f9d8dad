//! Shell command analysis
//!
//! This module provides:
//! - `split_command` - Split on control operators, quote-aware
//! - `generate_command_prefixes` - Grantable prefixes, general to specific
//! - `is_unsafe_compound_command` - Whether static prefix trust is unsafe
//! - `CommandAnalyzer` / `derive_command_prefix` - Trust prefix per command

mod analyzer;
mod parse;

pub use analyzer::{
    derive_command_prefix, CommandAnalysis, CommandAnalyzer, CommandPrefix, HeuristicAnalyzer,
    SubcommandPrefixMap,
};
pub use parse::{
    generate_command_prefixes, has_command_substitution, has_unterminated_quote,
    is_unsafe_compound_command, split_command, tokenize,
};
