//! Search 工具：调用 Serper 风格的搜索 API，返回排序结果
//!
//! POST {"q": query} 到配置的端点，API Key 从 SERPER_API_KEY 读取；
//! 无副作用、网络受限；请求带超时，超时映射为 ToolError::Timeout 而非无限阻塞。

use reqwest::Client;
use serde_json::{json, Value};

use async_trait::async_trait;

use crate::core::ToolError;
use crate::schema::{FieldType, Schema, SchemaField};
use crate::tools::Tool;

/// 默认搜索端点（Serper）
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";

/// Search 工具：query -> 排序的 {title, snippet, url} 列表
pub struct SearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
}

impl SearchTool {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: std::env::var("SERPER_API_KEY").ok().filter(|k| !k.is_empty()),
            max_results,
        }
    }

    /// 显式凭据（测试用）
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// 将搜索 API 响应的 organic 列表映射为 {title, snippet, url}，按原排序截断
    fn ranked_results(&self, body: &Value) -> Vec<Value> {
        body.get("organic")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .take(self.max_results)
                    .map(|item| {
                        json!({
                            "title": item.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                            "snippet": item.get("snippet").and_then(|v| v.as_str()).unwrap_or(""),
                            "url": item.get("link").and_then(|v| v.as_str()).unwrap_or(""),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web for current news and information. Args: {\"query\": \"...\"}. Returns ranked results with title, snippet and url."
    }

    fn input_schema(&self) -> Schema {
        Schema::new("search_args").field(SchemaField::required(
            "query",
            FieldType::Text,
            "The search query",
        ))
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if query.is_empty() {
            return Err(ToolError::InvalidArgs("query must not be empty".to_string()));
        }
        let api_key = self.api_key.as_deref().ok_or(ToolError::MissingCredentials)?;

        tracing::info!(query = %query, "search tool request");
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout("search".to_string())
                } else {
                    ToolError::Failed(format!("search request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ToolError::Failed(format!("search HTTP {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("search response parse: {}", e)))?;

        Ok(json!({ "results": self.ranked_results(&body) }))
    }
}
