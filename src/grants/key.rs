//! Permission keys
//!
//! The same function builds the key on the check path and on the save path;
//! there is no other way to produce one.

use serde_json::{json, Value};

use crate::tools::{Tool, ToolKind};

/// Canonical grant key for an invocation.
///
/// - Shell tool with a prefix: `Bash(<prefix>:*)`
/// - Shell tool without one: `Bash(<rendered command>)`
/// - Any other tool: the bare tool name
pub fn permission_key(tool: &dyn Tool, input: &Value, prefix: Option<&str>) -> String {
    match tool.kind() {
        ToolKind::Shell => match prefix {
            Some(prefix) => format!("{}({}:*)", tool.name(), prefix),
            None => format!("{}({})", tool.name(), tool.render_tool_use_message(input)),
        },
        ToolKind::FileMutation | ToolKind::Other => tool.name().to_string(),
    }
}

/// Key for a shell `command`, as if it had been the tool input
pub fn shell_command_key(tool: &dyn Tool, command: &str, prefix: Option<&str>) -> String {
    permission_key(tool, &json!({ "command": command }), prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{BashTool, EditTool, ReadTool};

    #[test]
    fn test_shell_keys() {
        let input = json!({"command": "git commit -m 'x'"});
        assert_eq!(
            permission_key(&BashTool, &input, None),
            "Bash(git commit -m 'x')"
        );
        assert_eq!(
            permission_key(&BashTool, &input, Some("git commit")),
            "Bash(git commit:*)"
        );
        assert_eq!(
            shell_command_key(&BashTool, "git commit -m 'x'", None),
            permission_key(&BashTool, &input, None)
        );
    }

    #[test]
    fn test_other_tools_are_coarse() {
        let input = json!({"file_path": "a.rs"});
        assert_eq!(permission_key(&EditTool, &input, None), "Edit");
        assert_eq!(permission_key(&EditTool, &input, Some("ignored")), "Edit");
        assert_eq!(permission_key(&ReadTool, &input, None), "Read");
    }
}
