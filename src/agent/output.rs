//! 智能体输出解析
//!
//! 完成能力每轮返回两种形态之一：JSON 工具调用 {"tool": "...", "args": {...}}，
//! 或最终回答（自由文本，也可能本身是结构化 JSON 载荷）。
//! 含 "tool" 键但 JSON 损坏时报 OutputParse，由运行时把纠正提示写回上下文后重试。

use serde_json::Value;

use crate::core::AgentError;
use crate::schema::extract_json_block;

/// 一轮输出的解析结果
#[derive(Debug, Clone)]
pub enum AgentAction {
    /// 需要执行工具
    ToolCall { tool: String, args: Value },
    /// 最终回答（原文，含可能的 JSON 载荷）
    Final(String),
}

/// 解析单轮输出：含非空 "tool" 字段的有效 JSON 为 ToolCall，其余为最终回答
pub fn parse_agent_output(output: &str) -> Result<AgentAction, AgentError> {
    let trimmed = output.trim();

    let Some(json_str) = extract_json_block(trimmed) else {
        return Ok(AgentAction::Final(trimmed.to_string()));
    };

    match serde_json::from_str::<Value>(json_str) {
        Ok(value) => {
            let tool = value.get("tool").and_then(|v| v.as_str()).unwrap_or("");
            if tool.is_empty() {
                // JSON 但不是工具调用：结构化最终回答
                Ok(AgentAction::Final(trimmed.to_string()))
            } else {
                let args = value.get("args").cloned().unwrap_or_else(|| Value::Object(Default::default()));
                Ok(AgentAction::ToolCall {
                    tool: tool.to_string(),
                    args,
                })
            }
        }
        Err(e) => {
            // 明显想发工具调用却给了坏 JSON -> 解析错误；普通文本照常作为最终回答
            if json_str.contains("\"tool\"") {
                Err(AgentError::OutputParse(format!("{}: {}", e, json_str)))
            } else {
                Ok(AgentAction::Final(trimmed.to_string()))
            }
        }
    }
}
