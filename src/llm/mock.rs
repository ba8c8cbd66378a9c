//! Mock 完成客户端（用于测试与无 API Key 的本地运行）
//!
//! MockCompletionClient 回显最后一条 User 消息为最终回答；
//! ScriptedCompletionClient 按脚本顺序返回预设回复，供 Manager / Agent 测试编排完整流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionClient, Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockCompletionClient;

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 脚本客户端：依次弹出预设回复；脚本耗尽后返回错误
pub struct ScriptedCompletionClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedCompletionClient {
    pub fn new(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// 剩余未消费的脚本条数
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "scripted responses exhausted".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let client = MockCompletionClient;
        let out = client
            .complete(&[Message::system("sys"), Message::user("hello")])
            .await
            .unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn test_scripted_returns_in_order_then_errors() {
        let client = ScriptedCompletionClient::new(vec!["one", "two"]);
        assert_eq!(client.complete(&[]).await.unwrap(), "one");
        assert_eq!(client.complete(&[]).await.unwrap(), "two");
        assert!(client.complete(&[]).await.is_err());
    }
}
