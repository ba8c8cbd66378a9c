//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，invoke(tool_name, args) 在超时内调用 registry.invoke，
//! 超时转为 ToolError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时；所有错误以 ToolError 回传给调用方
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；超时返回 Timeout；输出 JSON 审计日志
    pub async fn invoke(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.invoke(tool_name, args)).await;

        let result = match result {
            Ok(inner) => inner,
            Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok".to_string()),
            Err(e) => (false, e.to_string()),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
