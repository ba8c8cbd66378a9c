//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册与查找；
//! invoke 前先用通用 Schema 校验器检查参数，再执行。工具结果只经由智能体输出回流，
//! 不直接改写任务或记忆状态。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ToolError;
use crate::schema::Schema;

/// 工具 trait：名称、描述（供 LLM 理解）、参数契约、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数契约：执行前由注册表按此校验 args
    fn input_schema(&self) -> Schema;

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / invoke / tool_names
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// 校验参数后执行指定工具；未注册 -> Unknown，参数不符 -> InvalidArgs
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.input_schema()
            .check(&args)
            .map_err(ToolError::InvalidArgs)?;
        tool.execute(args).await
    }
}
