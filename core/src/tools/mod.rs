//! The canonical built-in tool set (C6). Each submodule implements one
//! tool's `parameters`/`validate`/`run` contract over `conveyor_exec`'s
//! `ExecutionAdapter`; `register_builtin_tools` wires the whole set into a
//! fresh [`crate::registry::ToolRegistry`].

mod batch;
mod bash;
mod file_edit;
mod file_read;
mod file_write;
mod glob_tool;
mod grep_tool;
mod ls_tool;
mod sub_agent;
mod think;

pub use batch::BatchTool;
pub use bash::BashTool;
pub use file_edit::FileEditTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use glob_tool::GlobTool;
pub use grep_tool::GrepTool;
pub use ls_tool::LsTool;
pub use sub_agent::SubAgentConfig;
pub use sub_agent::SubAgentRunner;
pub use sub_agent::SubAgentTool;

use std::sync::Arc;

use crate::error::Result;
use crate::registry::ToolRegistry;

pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<()> {
    registry.register(Arc::new(BashTool::new()))?;
    registry.register(Arc::new(FileReadTool::new()))?;
    registry.register(Arc::new(FileEditTool::new()))?;
    registry.register(Arc::new(FileWriteTool::new()))?;
    registry.register(Arc::new(GlobTool::new()))?;
    registry.register(Arc::new(GrepTool::new()))?;
    registry.register(Arc::new(LsTool::new()))?;
    registry.register(Arc::new(think::ThinkTool::new()))?;
    registry.register(Arc::new(BatchTool::new()))?;
    Ok(())
}
