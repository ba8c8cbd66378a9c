//! 核心：错误分类与 Run 装配

pub mod error;
pub mod orchestrator;

pub use error::{AgentError, EngineError, GraphError, MemoryError, ToolError};
pub use orchestrator::Orchestrator;
