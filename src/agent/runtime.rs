//! 智能体运行时
//!
//! AgentSpec 是纯配置（角色、目标、可用工具、记忆权限、可否委派），Run 内多任务共享只读实例；
//! AgentRuntime::perform 执行有界工具循环：每轮由完成能力决定调用工具或给出最终回答，
//! 工具结果（含错误）作为观察写回上下文；轮次耗尽未得到回答则返回 BudgetExceeded。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{parse_agent_output, AgentAction};
use crate::core::{AgentError, EngineError};
use crate::llm::{CompletionClient, Message};
use crate::tools::ToolExecutor;

/// 观察内容写回上下文时的最大字符数
const OBSERVATION_MAX_CHARS: usize = 4000;

/// 智能体配置：能力标签（role）按数据驱动方式匹配任务，不用类型层级
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub id: String,
    /// 能力标签，Manager 按此为任务选派智能体
    pub role: String,
    pub goal: String,
    /// 风格 / 背景描述，拼入 system prompt
    pub backstory: String,
    /// 可调用的工具名；空表示不用工具
    pub tools: Vec<String>,
    /// 是否可读写记忆
    pub memory_access: bool,
    /// 是否可接收再路由的工作（层级流程的委派标志）
    pub allow_delegation: bool,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, role: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: String::new(),
            tools: Vec::new(),
            memory_access: false,
            allow_delegation: false,
        }
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<impl Into<String>>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_memory(mut self, memory_access: bool) -> Self {
        self.memory_access = memory_access;
        self
    }

    pub fn with_delegation(mut self, allow_delegation: bool) -> Self {
        self.allow_delegation = allow_delegation;
        self
    }
}

/// 运行时：配置 + 完成客户端 + 工具轮次上限
pub struct AgentRuntime {
    pub spec: AgentSpec,
    llm: Arc<dyn CompletionClient>,
    max_tool_rounds: usize,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("spec", &self.spec)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    pub fn new(spec: AgentSpec, llm: Arc<dyn CompletionClient>, max_tool_rounds: usize) -> Self {
        Self {
            spec,
            llm,
            max_tool_rounds,
        }
    }

    /// 拼 system prompt：角色 / 目标 / 背景 + 该智能体可用的工具清单与调用格式
    fn system_prompt(&self, executor: &ToolExecutor) -> String {
        let mut prompt = format!("You are {}.\nGoal: {}\n", self.spec.role, self.spec.goal);
        if !self.spec.backstory.is_empty() {
            prompt.push_str(&self.spec.backstory);
            prompt.push('\n');
        }

        let available: Vec<(String, String)> = executor
            .tool_descriptions()
            .into_iter()
            .filter(|(name, _)| self.spec.tools.iter().any(|t| t == name))
            .collect();
        if !available.is_empty() {
            prompt.push_str("\n## Available tools\n");
            for (name, description) in &available {
                prompt.push_str(&format!("- {}: {}\n", name, description));
            }
            prompt.push_str(
                "\nTo call a tool, reply with exactly one JSON object: \
                 {\"tool\": \"<name>\", \"args\": {...}}.\n\
                 When you have the final answer, reply with the answer itself and no tool JSON.\n",
            );
        }
        prompt
    }

    /// 为任务产出原始输出；context 已由 Manager 装配（上游结果 + 记忆匹配 + 契约说明）
    pub async fn perform(
        &self,
        task_description: &str,
        context: &str,
        executor: &ToolExecutor,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let system = self.system_prompt(executor);
        let mut messages = vec![Message::system(system)];
        let mut user_prompt = format!("## Task\n{}\n", task_description);
        if !context.is_empty() {
            user_prompt.push_str(&format!("\n{}\n", context));
        }
        messages.push(Message::user(user_prompt));

        for round in 0..self.max_tool_rounds {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled.into());
            }

            let output = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
                result = self.llm.complete(&messages) => {
                    result.map_err(AgentError::Completion)?
                }
            };

            match parse_agent_output(&output) {
                Ok(AgentAction::Final(answer)) => {
                    tracing::debug!(agent = %self.spec.id, round, "final answer");
                    return Ok(answer);
                }
                Ok(AgentAction::ToolCall { tool, args }) => {
                    tracing::debug!(agent = %self.spec.id, tool = %tool, round, "tool call");
                    let observation = if !self.spec.tools.iter().any(|t| t == &tool) {
                        format!("Error: tool '{}' is not available to this agent", tool)
                    } else {
                        // 取消需传播到执行中的工具网络调用
                        let result = tokio::select! {
                            _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
                            result = executor.invoke(&tool, args.clone()) => result,
                        };
                        match result {
                            Ok(value) => truncate_observation(&value.to_string()),
                            Err(e) => format!("Error: {}", e),
                        }
                    };
                    // 工具调用与观察写回对话，供下一轮使用
                    messages.push(Message::assistant(format!("Tool call: {} | args: {}", tool, args)));
                    messages.push(Message::user(format!("Observation from {}: {}", tool, observation)));
                }
                Err(e) => {
                    tracing::debug!(agent = %self.spec.id, round, "output parse retry: {}", e);
                    messages.push(Message::user(format!(
                        "Your tool call was not valid JSON ({}). Reply with a valid \
                         {{\"tool\": ..., \"args\": ...}} object or with the final answer.",
                        e
                    )));
                }
            }
        }

        Err(AgentError::BudgetExceeded(self.max_tool_rounds).into())
    }
}

fn truncate_observation(s: &str) -> String {
    if s.chars().count() > OBSERVATION_MAX_CHARS {
        format!(
            "{}...[truncated]",
            s.chars().take(OBSERVATION_MAX_CHARS).collect::<String>()
        )
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolError;
    use crate::llm::ScriptedCompletionClient;
    use crate::schema::{FieldType, Schema, SchemaField};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StubSearch;

    #[async_trait]
    impl Tool for StubSearch {
        fn name(&self) -> &str {
            "search"
        }

        fn description(&self) -> &str {
            "stub search"
        }

        fn input_schema(&self) -> Schema {
            Schema::new("search_args").field(SchemaField::required("query", FieldType::Text, "q"))
        }

        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Ok(json!({"results": [{"title": "Acme beats earnings"}]}))
        }
    }

    struct FailingNotify;

    #[async_trait]
    impl Tool for FailingNotify {
        fn name(&self) -> &str {
            "notify"
        }

        fn description(&self) -> &str {
            "stub notify"
        }

        fn input_schema(&self) -> Schema {
            Schema::new("notify_args").field(SchemaField::required("message", FieldType::Text, "m"))
        }

        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Err(ToolError::DeliveryFailed("HTTP 500".to_string()))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(StubSearch);
        registry.register(FailingNotify);
        ToolExecutor::new(registry, 5)
    }

    fn runtime(llm: ScriptedCompletionClient, max_rounds: usize) -> AgentRuntime {
        let spec = AgentSpec::new("finder", "trending_company_finder", "Find trending companies")
            .with_tools(vec!["search", "notify"]);
        AgentRuntime::new(spec, Arc::new(llm), max_rounds)
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let llm = ScriptedCompletionClient::new(vec!["The answer is Acme."]);
        let out = runtime(llm, 3)
            .perform("find companies", "", &executor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "The answer is Acme.");
    }

    #[tokio::test]
    async fn test_tool_round_then_final() {
        let llm = ScriptedCompletionClient::new(vec![
            r#"{"tool": "search", "args": {"query": "trending"}}"#.to_string(),
            "Found: Acme".to_string(),
        ]);
        let out = runtime(llm, 3)
            .perform("find companies", "", &executor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "Found: Acme");
    }

    #[tokio::test]
    async fn test_budget_exceeded() {
        let llm = ScriptedCompletionClient::new(vec![
            r#"{"tool": "search", "args": {"query": "a"}}"#.to_string(),
            r#"{"tool": "search", "args": {"query": "b"}}"#.to_string(),
        ]);
        let err = runtime(llm, 2)
            .perform("find companies", "", &executor(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Agent(AgentError::BudgetExceeded(2)));
    }

    #[tokio::test]
    async fn test_tool_error_surfaces_as_observation_and_task_continues() {
        let llm = ScriptedCompletionClient::new(vec![
            r#"{"tool": "notify", "args": {"message": "RECOMMENDATION: Acme"}}"#.to_string(),
            "RECOMMENDATION: Acme (notification could not be delivered)".to_string(),
        ]);
        let out = runtime(llm, 3)
            .perform("pick best company", "", &executor(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.contains("RECOMMENDATION: Acme"));
    }

    #[tokio::test]
    async fn test_unlisted_tool_is_rejected_in_context() {
        let spec = AgentSpec::new("analyst", "financial_researcher", "Analyze companies");
        // 该智能体未声明任何工具
        let llm = ScriptedCompletionClient::new(vec![
            r#"{"tool": "search", "args": {"query": "x"}}"#.to_string(),
            "analysis done".to_string(),
        ]);
        let runtime = AgentRuntime::new(spec, Arc::new(llm), 3);
        let out = runtime
            .perform("analyze", "", &executor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "analysis done");
    }

    #[tokio::test]
    async fn test_cancelled_before_round() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let llm = ScriptedCompletionClient::new(vec!["never used"]);
        let err = runtime(llm, 3)
            .perform("find companies", "", &executor(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Agent(AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_parse_error_feeds_correction_then_recovers() {
        let llm = ScriptedCompletionClient::new(vec![
            r#"{"tool": "search", "args": {"query": }"#.to_string(),
            "final after correction".to_string(),
        ]);
        let out = runtime(llm, 3)
            .perform("find companies", "", &executor(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "final after correction");
    }
}
