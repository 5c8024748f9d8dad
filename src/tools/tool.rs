//! Tool trait definition
//!
//! The authorization core never executes tools. It only needs enough of each
//! tool to decide whether a proposed invocation may run.

use async_trait::async_trait;
use serde_json::Value;

/// How a tool is treated by the permission evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Runs shell commands; authorized per command and per prefix
    Shell,
    /// Mutates the filesystem; grants are always session-scoped
    FileMutation,
    /// Anything else; authorized by bare tool name
    Other,
}

/// Trait for tools whose invocations pass through the permission gate
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// How the evaluator treats this tool
    fn kind(&self) -> ToolKind {
        ToolKind::Other
    }

    /// Whether this invocation needs a permission check at all
    ///
    /// Default is true - tools should generally require permission.
    fn needs_permissions(&self, _input: &Value) -> bool {
        true
    }

    /// Human-readable description of what this invocation will do
    async fn description(&self, input: &Value) -> String;

    /// Textual rendering of the invocation
    ///
    /// For the shell tool this is the command itself and feeds the exact-match
    /// permission key.
    fn render_tool_use_message(&self, input: &Value) -> String;
}

/// Read the `command` field of a shell tool input
pub fn command_of(input: &Value) -> Option<&str> {
    input.get("command").and_then(|v| v.as_str())
}
