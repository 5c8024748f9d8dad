//! Filesystem-mutating tool descriptors: Edit, Write, NotebookEdit

use async_trait::async_trait;
use serde_json::Value;

use super::super::tool::{Tool, ToolKind};

fn path_of<'a>(input: &'a Value, field: &str) -> &'a str {
    input.get(field).and_then(|v| v.as_str()).unwrap_or("?")
}

/// Edit tool (string replacement in an existing file)
#[derive(Debug, Default, Clone, Copy)]
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "Edit"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileMutation
    }

    async fn description(&self, input: &Value) -> String {
        format!("Edit file: {}", path_of(input, "file_path"))
    }

    fn render_tool_use_message(&self, input: &Value) -> String {
        path_of(input, "file_path").to_string()
    }
}

/// Write tool (create or overwrite a file)
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileMutation
    }

    async fn description(&self, input: &Value) -> String {
        format!("Write file: {}", path_of(input, "file_path"))
    }

    fn render_tool_use_message(&self, input: &Value) -> String {
        path_of(input, "file_path").to_string()
    }
}

/// Notebook cell editor
#[derive(Debug, Default, Clone, Copy)]
pub struct NotebookEditTool;

#[async_trait]
impl Tool for NotebookEditTool {
    fn name(&self) -> &str {
        "NotebookEdit"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::FileMutation
    }

    async fn description(&self, input: &Value) -> String {
        format!("Edit notebook: {}", path_of(input, "notebook_path"))
    }

    fn render_tool_use_message(&self, input: &Value) -> String {
        path_of(input, "notebook_path").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_tools_are_mutations() {
        let input = json!({"file_path": "src/lib.rs"});
        assert_eq!(EditTool.kind(), ToolKind::FileMutation);
        assert_eq!(WriteTool.kind(), ToolKind::FileMutation);
        assert_eq!(NotebookEditTool.kind(), ToolKind::FileMutation);
        assert_eq!(EditTool.description(&input).await, "Edit file: src/lib.rs");
        assert_eq!(WriteTool.render_tool_use_message(&input), "src/lib.rs");
    }

    #[tokio::test]
    async fn test_missing_path() {
        assert_eq!(
            NotebookEditTool.description(&json!({})).await,
            "Edit notebook: ?"
        );
    }
}
