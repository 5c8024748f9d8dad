//! Bash tool descriptor
//!
//! Shell invocations are authorized per command: exact grants, prefix grants
//! and the bash policy documents all key off the `command` input field.

use async_trait::async_trait;
use serde_json::Value;

use super::super::tool::{command_of, Tool, ToolKind};

/// Name the shell tool is registered under
pub const BASH_TOOL_NAME: &str = "Bash";

/// Bash tool for executing shell commands
#[derive(Debug, Default, Clone, Copy)]
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        BASH_TOOL_NAME
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    async fn description(&self, input: &Value) -> String {
        if let Some(desc) = input.get("description").and_then(|v| v.as_str()) {
            return desc.to_string();
        }
        match command_of(input) {
            Some(command) => format!("Execute: {}", command),
            None => "Execute a shell command".to_string(),
        }
    }

    fn render_tool_use_message(&self, input: &Value) -> String {
        command_of(input).unwrap_or("<unknown command>").to_string()
    }
}
