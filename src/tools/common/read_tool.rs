//! Read tool descriptor

use async_trait::async_trait;
use serde_json::Value;

use super::super::tool::Tool;

/// Read tool; reading never needs a permission check
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn needs_permissions(&self, _input: &Value) -> bool {
        false
    }

    async fn description(&self, input: &Value) -> String {
        let path = input.get("file_path").and_then(|v| v.as_str()).unwrap_or("?");
        format!("Read file: {}", path)
    }

    fn render_tool_use_message(&self, input: &Value) -> String {
        input
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string()
    }
}
