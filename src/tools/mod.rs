//! Tool descriptors for the permission gate
//!
//! This module provides:
//! - `Tool` trait - What the evaluator needs to know about a tool
//! - `ToolKind` - Shell / filesystem-mutation / other classification
//! - `ToolRegistry` - Lookup by name
//! - `common` - Built-in tools (Bash, Read, Edit, Write, NotebookEdit)

mod registry;
mod tool;

/// Common/built-in tools
pub mod common;

pub use registry::ToolRegistry;
pub use tool::{command_of, Tool, ToolKind};

pub use common::{BashTool, EditTool, NotebookEditTool, ReadTool, WriteTool};
