//! 推送通知工具：Pushover 风格的外部通知
//!
//! 凭据来自 PUSHOVER_USER / PUSHOVER_TOKEN，端点可用 PUSHOVER_URL 覆盖。
//! 缺少凭据时快速失败（MissingCredentials），不发起任何网络请求；
//! 网络或非 2xx 失败映射为 DeliveryFailed 且不自动重试；失败作为工具结果
//! 回传给调用智能体，任务仍可带降级说明完成。

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde_json::{json, Value};

use async_trait::async_trait;

use crate::core::ToolError;
use crate::schema::{FieldType, Schema, SchemaField};
use crate::tools::Tool;

/// 默认 Pushover 端点
pub const DEFAULT_PUSH_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";

/// 推送工具：message -> {"status": "ok"} 或 ToolError
pub struct PushTool {
    client: Client,
    user: Option<String>,
    token: Option<String>,
    endpoint: String,
    /// 已发起的网络请求次数（凭据校验通过后才计数，供测试断言「零请求」）
    network_attempts: AtomicU64,
}

impl PushTool {
    /// 从环境变量读取凭据与端点覆盖
    pub fn from_env(timeout_secs: u64) -> Self {
        let endpoint =
            std::env::var("PUSHOVER_URL").unwrap_or_else(|_| DEFAULT_PUSH_ENDPOINT.to_string());
        Self::new(
            std::env::var("PUSHOVER_USER").ok().filter(|v| !v.is_empty()),
            std::env::var("PUSHOVER_TOKEN").ok().filter(|v| !v.is_empty()),
            endpoint,
            timeout_secs,
        )
    }

    pub fn new(
        user: Option<String>,
        token: Option<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            user,
            token,
            endpoint: endpoint.into(),
            network_attempts: AtomicU64::new(0),
        }
    }

    /// 已发起的网络请求次数
    pub fn network_attempts(&self) -> u64 {
        self.network_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for PushTool {
    fn name(&self) -> &str {
        "notify"
    }

    fn description(&self) -> &str {
        "Send a push notification to the user. Args: {\"message\": \"...\"}. Use when an important decision or result should reach the user immediately."
    }

    fn input_schema(&self) -> Schema {
        Schema::new("notify_args").field(SchemaField::required(
            "message",
            FieldType::Text,
            "The notification text to deliver",
        ))
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if message.is_empty() {
            return Err(ToolError::InvalidArgs("message must not be empty".to_string()));
        }

        // 凭据检查在任何网络 I/O 之前
        let (user, token) = match (self.user.as_deref(), self.token.as_deref()) {
            (Some(user), Some(token)) => (user, token),
            _ => return Err(ToolError::MissingCredentials),
        };

        tracing::info!(message = %message, "push notification");
        self.network_attempts.fetch_add(1, Ordering::SeqCst);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("user", user), ("token", token), ("message", message.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout("notify".to_string())
                } else {
                    ToolError::DeliveryFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ToolError::DeliveryFailed(format!("HTTP {}", response.status())));
        }

        Ok(json!({"status": "ok"}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_missing_credentials_makes_zero_network_calls() {
        let tool = PushTool::new(None, None, DEFAULT_PUSH_ENDPOINT, 5);
        let err = tool
            .execute(json!({"message": "RECOMMENDATION: Acme"}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::MissingCredentials);
        assert_eq!(tool.network_attempts(), 0);
    }

    #[tokio::test]
    async fn test_partial_credentials_also_fail_fast() {
        let tool = PushTool::new(Some("user".to_string()), None, DEFAULT_PUSH_ENDPOINT, 5);
        let err = tool.execute(json!({"message": "hi"})).await.unwrap_err();
        assert_eq!(err, ToolError::MissingCredentials);
        assert_eq!(tool.network_attempts(), 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let tool = PushTool::new(
            Some("user".to_string()),
            Some("token".to_string()),
            DEFAULT_PUSH_ENDPOINT,
            5,
        );
        let err = tool.execute(json!({"message": ""})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
        assert_eq!(tool.network_attempts(), 0);
    }

    /// 单连接 HTTP 服务器：读完请求后返回固定状态行
    async fn one_shot_server(status_line: &'static str) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_http_500_maps_to_delivery_failed() {
        let addr = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let tool = PushTool::new(
            Some("user".to_string()),
            Some("token".to_string()),
            format!("http://{}", addr),
            5,
        );

        let err = tool
            .execute(json!({"message": "RECOMMENDATION: Acme"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::DeliveryFailed(_)));
        assert_eq!(tool.network_attempts(), 1);
    }

    #[tokio::test]
    async fn test_2xx_is_ok() {
        let addr = one_shot_server("HTTP/1.1 200 OK").await;
        let tool = PushTool::new(
            Some("user".to_string()),
            Some("token".to_string()),
            format!("http://{}", addr),
            5,
        );

        let out = tool.execute(json!({"message": "hi"})).await.unwrap();
        assert_eq!(out["status"], "ok");
    }
}
