//! Schema 注册表
//!
//! 按名注册输出契约，validate(name, raw) 从原始输出中提取 JSON 块（```json 围栏或裸 JSON）
//! 后做结构校验；未声明 Schema 的任务直接接受自由文本，不经过本模块。

use std::collections::HashMap;

use serde_json::Value;

use crate::core::EngineError;
use crate::schema::Schema;

/// 从 LLM 输出中提取 JSON 块：优先 ```json 围栏，其次首个 { 到末个 }
pub fn extract_json_block(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(inner.trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}

/// Schema 注册表：名称 -> Schema，供 Manager 在任务完成时校验结构化输出
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    /// 渲染指定 Schema 的契约说明，拼入智能体上下文
    pub fn prompt_block(&self, name: &str) -> Option<String> {
        self.schemas.get(name).map(|s| s.to_prompt_block())
    }

    /// 校验原始输出：提取 JSON -> 解析 -> 按 Schema 树检查；任何一步失败均为 SchemaViolation
    pub fn validate(&self, name: &str, raw_output: &str) -> Result<Value, EngineError> {
        let schema = self
            .schemas
            .get(name)
            .ok_or_else(|| EngineError::SchemaViolation(format!("unknown schema: {}", name)))?;

        let json_str = extract_json_block(raw_output).ok_or_else(|| {
            EngineError::SchemaViolation(format!("{}: no JSON object found in output", name))
        })?;

        let value: Value = serde_json::from_str(json_str).map_err(|e| {
            EngineError::SchemaViolation(format!("{}: invalid JSON: {}", name, e))
        })?;

        schema.check(&value).map_err(EngineError::SchemaViolation)?;
        Ok(value)
    }
}
