//! 任务图类型定义
//!
//! 任务、状态、结果载荷。任务由图持有，构图后不删除；
//! 状态仅经图操作推进，结果恰好写入一次（done 只进入一次）。

use serde_json::Value;

pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// 等待上游完成
    Pending,
    /// 上游全部 done，可分派
    Ready,
    /// 已分派给智能体执行
    Running,
    /// 结果已校验并记录
    Done,
    /// 重试耗尽后失败
    Failed,
}

/// 任务结果：结构化（已通过 Schema 校验）或自由文本
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Structured(Value),
    Text(String),
}

impl TaskResult {
    /// 序列化为下游上下文中的稳定文本形式；结构化结果用 pretty JSON，
    /// 重新解析后字段值不变（跨智能体传递按文本/结构，不共享内存）
    pub fn to_context_text(&self) -> String {
        match self {
            TaskResult::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            TaskResult::Text(text) => text.clone(),
        }
    }
}

/// 任务：描述、所需能力标签、可选输出契约、上游依赖
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// 执行本任务所需的能力标签（对应 AgentSpec::role）
    pub required_role: String,
    /// 输出契约名（SchemaRegistry 注册名）；None 表示接受自由文本
    pub schema: Option<String>,
    /// 上游任务，按此顺序装配上下文
    pub upstream: Vec<TaskId>,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        description: impl Into<String>,
        required_role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required_role: required_role.into(),
            schema: None,
            upstream: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_upstream(mut self, upstream: Vec<impl Into<TaskId>>) -> Self {
        self.upstream = upstream.into_iter().map(Into::into).collect();
        self
    }
}
