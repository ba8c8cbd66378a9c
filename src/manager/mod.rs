//! 层级调度：能力标签注册表、委派再路由与 Manager 状态机

pub mod controller;
pub mod registry;

pub use controller::{Manager, ManagerState, RunParams, RunReport, RunStatus, DEFAULT_RETRY_LIMIT};
pub use registry::AgentRegistry;
