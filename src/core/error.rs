//! 引擎错误类型
//!
//! 按层划分子错误（Schema / Tool / Agent / Graph / Memory），由 EngineError 统一聚合；
//! 工具错误回传给智能体作为观察结果，不致命；图错误在构造期触发，运行期不出现。

use thiserror::Error;

/// 工具调用错误：超时、缺少凭据、投递失败等，均作为工具结果回传，不终止进程
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),
}

/// 智能体运行错误：完成调用失败、输出解析失败、工具轮次超限、被取消
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// 工具调用轮次达到上限仍未给出最终回答
    #[error("Tool round budget exceeded ({0} rounds)")]
    BudgetExceeded(usize),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Output parse error: {0}")]
    OutputParse(String),

    #[error("Cancelled")]
    Cancelled,
}

/// 任务图构造错误：环、未知依赖、重复任务；record_result 重复写入也在此
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cycle detected in task graph")]
    CycleDetected,

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    /// 任务已进入 done，拒绝二次写入结果
    #[error("Result already recorded for task: {0}")]
    AlreadyRecorded(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
}

/// 记忆子系统错误：长期库打开失败在 Run 启动时致命；查询失败由调用方降级处理
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Memory I/O error: {0}")]
    Io(String),
}

/// 引擎统一错误：Manager 与外层按此分类决定重试 / 失败 / 终止
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 输出不符合声明的 Schema；Manager 最多重试一次
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// 没有能力标签匹配的智能体，且无可委派者
    #[error("No eligible agent for role: {0}")]
    NoEligibleAgent(String),
}
