//! Command prefix analysis
//!
//! Contains:
//! - `CommandAnalyzer` trait - classifies a command into a trust prefix
//! - `HeuristicAnalyzer` - the built-in, offline classifier
//! - `derive_command_prefix` - cancellable, time-bounded entry point
//!
//! Any analyzer failure is reported as an undetermined result (no prefix, no
//! injection flag), which callers must treat as "ask", never as "allow".

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::parse::{has_command_substitution, split_command, tokenize};
use crate::core::{GuardError, GuardResult};

/// Trust prefix derived for one command or sub-command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPrefix {
    /// Minimal leading portion treated as the command's trust category
    pub prefix: Option<String>,
    /// Whether the command could make a trusted prefix run something else
    pub command_injection_detected: bool,
}

impl CommandPrefix {
    /// A clean prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            command_injection_detected: false,
        }
    }

    /// A command flagged as a possible injection
    pub fn injection() -> Self {
        Self {
            prefix: None,
            command_injection_detected: true,
        }
    }

    /// A command with no determinable prefix
    pub fn none() -> Self {
        Self::default()
    }
}

/// One entry per logical segment of a compound command
pub type SubcommandPrefixMap = BTreeMap<String, CommandPrefix>;

/// Full analysis of a (possibly compound) command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandAnalysis {
    /// Prefix of the command as a whole
    pub command_prefix: CommandPrefix,
    /// Prefix of each sub-command, keyed by the sub-command text
    pub subcommand_prefixes: SubcommandPrefixMap,
}

impl CommandAnalysis {
    /// Result used when analysis failed or timed out
    pub fn undetermined() -> Self {
        Self::default()
    }

    /// True when there is neither a prefix nor an injection flag
    pub fn is_undetermined(&self) -> bool {
        self.command_prefix.prefix.is_none() && !self.command_prefix.command_injection_detected
    }

    /// Prefix shortcut
    pub fn prefix(&self) -> Option<&str> {
        self.command_prefix.prefix.as_deref()
    }

    /// Injection shortcut
    pub fn injection_detected(&self) -> bool {
        self.command_prefix.command_injection_detected
    }
}

/// Trait for command classifiers
///
/// Implementations may be slow (a network call to a model, for instance);
/// `derive_command_prefix` wraps every call with a timeout and cancellation.
#[async_trait]
pub trait CommandAnalyzer: Send + Sync {
    /// Classify `command` and each of its sub-commands
    async fn analyze(&self, command: &str) -> GuardResult<CommandAnalysis>;
}

/// Derive the prefix of `command`, honoring cancellation and a timeout.
///
/// Returns `Err(GuardError::Cancelled)` only when `cancel` fired, either
/// before the call or while it was in flight. Analyzer errors and timeouts
/// become `CommandAnalysis::undetermined()`.
pub async fn derive_command_prefix(
    analyzer: &dyn CommandAnalyzer,
    command: &str,
    cancel: &CancellationToken,
    timeout: Duration,
) -> GuardResult<CommandAnalysis> {
    if cancel.is_cancelled() {
        return Err(GuardError::Cancelled);
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GuardError::Cancelled),
        res = tokio::time::timeout(timeout, analyzer.analyze(command)) => res,
    };

    if cancel.is_cancelled() {
        return Err(GuardError::Cancelled);
    }

    match outcome {
        Ok(Ok(analysis)) => Ok(analysis),
        Ok(Err(GuardError::Cancelled)) => Err(GuardError::Cancelled),
        Ok(Err(e)) => {
            tracing::warn!("[Analyzer] Failed to analyze '{}': {}", command, e);
            Ok(CommandAnalysis::undetermined())
        }
        Err(_) => {
            tracing::warn!(
                "[Analyzer] {}",
                GuardError::AnalysisTimeout(timeout)
            );
            Ok(CommandAnalysis::undetermined())
        }
    }
}

/// Tools whose second word selects a sub-command (`git commit`, `npm run`)
const SUBCOMMAND_TOOLS: &[&str] = &[
    "apt", "apt-get", "brew", "bun", "cargo", "deno", "docker", "dotnet", "gh", "git", "go",
    "gradle", "helm", "kubectl", "make", "mvn", "npm", "npx", "pip", "pip3", "pnpm", "poetry",
    "rustup", "systemctl", "terraform", "uv", "yarn",
];

/// Patterns that let a trusted prefix run something other than itself
const INJECTION_PATTERNS: &[&str] = &[
    r"\$\{",
    r"(^|[\s;&|])eval(\s|$)",
    r"(^|[\s;&|])(ba|z|da|k)?sh\s+-c(\s|$)",
    r"(^|[\s;&|])(xargs|env|exec|nohup|sudo|doas)(\s|$)",
    r"\b(LD_PRELOAD|LD_LIBRARY_PATH|DYLD_INSERT_LIBRARIES|IFS)=",
];

/// Offline prefix classifier
///
/// The prefix is the command word, extended with its sub-command word for
/// tools like `git` and `npm`. Substitutions, parameter expansion and
/// command-running wrappers are flagged as injection.
pub struct HeuristicAnalyzer {
    injection_patterns: Vec<Regex>,
    subcommand_tools: HashSet<String>,
}

impl HeuristicAnalyzer {
    /// Create the analyzer with the built-in rules
    pub fn new() -> GuardResult<Self> {
        let injection_patterns = INJECTION_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GuardError::InvalidConfig(format!("bad injection pattern: {}", e)))?;

        Ok(Self {
            injection_patterns,
            subcommand_tools: SUBCOMMAND_TOOLS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Treat `tool` as having sub-commands
    pub fn with_subcommand_tool(mut self, tool: impl Into<String>) -> Self {
        self.subcommand_tools.insert(tool.into());
        self
    }

    fn looks_injected(&self, command: &str) -> bool {
        has_command_substitution(command)
            || self.injection_patterns.iter().any(|re| re.is_match(command))
    }

    /// Classify a single (non-compound) command
    pub fn classify(&self, command: &str) -> CommandPrefix {
        if self.looks_injected(command) {
            return CommandPrefix::injection();
        }

        let tokens = tokenize(command);
        let Some(first) = tokens.first() else {
            return CommandPrefix::none();
        };
        // Leading assignments change what the command does
        if first.contains('=') {
            return CommandPrefix::none();
        }

        match tokens.get(1) {
            Some(second)
                if self.subcommand_tools.contains(first.as_str())
                    && !second.is_empty()
                    && !second.starts_with('-') =>
            {
                CommandPrefix::new(format!("{} {}", first, second))
            }
            _ => CommandPrefix::new(first.clone()),
        }
    }
}

#[async_trait]
impl CommandAnalyzer for HeuristicAnalyzer {
    async fn analyze(&self, command: &str) -> GuardResult<CommandAnalysis> {
        let subcommands = split_command(command);
        let subcommand_prefixes: SubcommandPrefixMap = subcommands
            .iter()
            .map(|sub| (sub.clone(), self.classify(sub)))
            .collect();

        let command_prefix = if self.looks_injected(command)
            || subcommand_prefixes
                .values()
                .any(|p| p.command_injection_detected)
        {
            CommandPrefix::injection()
        } else if subcommands.len() == 1 {
            self.classify(&subcommands[0])
        } else {
            subcommands
                .first()
                .and_then(|first| subcommand_prefixes.get(first))
                .cloned()
                .unwrap_or_default()
        };

        tracing::debug!(
            "[Analyzer] '{}' -> prefix {:?}, injection {}",
            command,
            command_prefix.prefix,
            command_prefix.command_injection_detected
        );

        Ok(CommandAnalysis {
            command_prefix,
            subcommand_prefixes,
        })
    }
}
