//! Common/built-in tools
//!
//! - `BashTool` - Shell commands
//! - `ReadTool` - Read file contents (never gated)
//! - `EditTool`, `WriteTool`, `NotebookEditTool` - Filesystem mutations

pub mod bash;
pub mod edit_tool;
pub mod read_tool;

pub use bash::{BashTool, BASH_TOOL_NAME};
pub use edit_tool::{EditTool, NotebookEditTool, WriteTool};
pub use read_tool::ReadTool;
