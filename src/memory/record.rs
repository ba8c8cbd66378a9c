//! 记忆记录类型
//!
//! 三类存储共用一种记录：内容、可选主题键、可选嵌入向量、时间戳与来源任务/智能体。
//! 不变量：每条写入恰好归属一个 task/agent 对，保证可溯源。

use serde::{Deserialize, Serialize};

/// 记忆存储类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    /// 长期：SQLite 行存储，按键检索，跨进程持久
    LongTerm,
    /// 短期：相似度索引，仅保留最近 N 条交互
    ShortTerm,
    /// 实体：相似度索引，按命名实体聚合事实
    Entity,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::LongTerm => "long_term",
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::Entity => "entity",
        }
    }
}

/// 单条记忆记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub kind: MemoryKind,
    /// 主题键：长期存储的检索键（如任务 ID 或实体名）；向量存储中仅作元数据
    pub topic: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    /// Unix 毫秒时间戳
    pub created_at: i64,
    /// 来源任务（溯源）
    pub task_id: String,
    /// 来源智能体（溯源）
    pub agent_id: String,
}

impl MemoryRecord {
    pub fn new(
        kind: MemoryKind,
        content: impl Into<String>,
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            topic: None,
            content: content.into(),
            embedding: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
