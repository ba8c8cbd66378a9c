//! Manager / 委派控制器
//!
//! 任务图上的状态机：Idle -> Dispatching -> AwaitingResult -> (循环) -> Finalizing / Failed。
//! 每轮取一个就绪任务，按能力标签解析智能体（无精确匹配时经委派再路由），装配上下文
//! （参数插值 + 上游结果 + 记忆匹配 + 契约说明），执行并校验输出；可重试错误按配置
//! 上限本地重试（默认一次），耗尽则升级为 Run 级失败，但已校验的结果仍随报告返回。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentRuntime;
use crate::core::{AgentError, EngineError};
use crate::graph::{Task, TaskGraph, TaskId, TaskResult};
use crate::manager::AgentRegistry;
use crate::memory::{MemoryHandle, MemoryKind, MemoryRecord};
use crate::schema::SchemaRegistry;
use crate::tools::ToolExecutor;

/// Run 输入参数（如 {sector, region}），插值进任务描述
pub type RunParams = HashMap<String, String>;

/// 默认可重试次数（Schema 违例等本地可恢复错误）
pub const DEFAULT_RETRY_LIMIT: usize = 1;

/// Manager 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Dispatching,
    AwaitingResult,
    Finalizing,
    Failed,
}

/// Run 结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 所有任务 done
    Success,
    /// 失败但已有至少一个任务的已校验结果
    Partial,
    /// 失败且无任何结果
    Failed,
}

/// Run 报告：最终结果 + 迄今收集的全部已校验任务结果
#[derive(Debug)]
pub struct RunReport {
    /// 本次 Run 的标识（随机 UUID，日志关联用）
    pub run_id: String,
    pub status: RunStatus,
    /// 最后完成任务的结果（部分失败时的 best-effort 答案）
    pub final_output: Option<String>,
    pub results: Vec<(TaskId, TaskResult)>,
    pub failure: Option<String>,
}

/// 层级调度器：持有智能体注册表、Schema 注册表、工具执行器与记忆句柄
pub struct Manager {
    registry: AgentRegistry,
    schemas: SchemaRegistry,
    executor: ToolExecutor,
    memory: MemoryHandle,
    retry_limit: usize,
    state: ManagerState,
    /// 当前 Run 标识，run() 开始时生成
    run_id: String,
}

/// 将 {key} 占位符替换为参数值
fn interpolate(text: &str, params: &RunParams) -> String {
    let mut out = text.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// 从结构化结果中递归收集 (实体名, 所在对象)：凡含字符串字段 "name" 的对象计一个实体
fn extract_entities(value: &Value) -> Vec<(String, Value)> {
    let mut entities = Vec::new();
    match value {
        Value::Object(map) => {
            if let Some(name) = map.get("name").and_then(|v| v.as_str()) {
                entities.push((name.to_string(), value.clone()));
            }
            for v in map.values() {
                entities.extend(extract_entities(v));
            }
        }
        Value::Array(items) => {
            for item in items {
                entities.extend(extract_entities(item));
            }
        }
        _ => {}
    }
    entities
}

/// 本地可重试的错误：Schema 违例与非取消的智能体错误；工具错误不会冒泡到这里
fn is_retryable(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::SchemaViolation(_)
            | EngineError::Agent(
                AgentError::BudgetExceeded(_) | AgentError::Completion(_) | AgentError::OutputParse(_)
            )
    )
}

impl Manager {
    pub fn new(
        registry: AgentRegistry,
        schemas: SchemaRegistry,
        executor: ToolExecutor,
        memory: MemoryHandle,
    ) -> Self {
        Self {
            registry,
            schemas,
            executor,
            memory,
            retry_limit: DEFAULT_RETRY_LIMIT,
            state: ManagerState::Idle,
            run_id: String::new(),
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    fn set_state(&mut self, next: ManagerState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "manager state");
            self.state = next;
        }
    }

    /// 执行整个任务图；返回 Run 报告（成功 / 部分 / 失败）
    pub async fn run(
        &mut self,
        graph: &mut TaskGraph,
        params: &RunParams,
        cancel: CancellationToken,
    ) -> RunReport {
        self.run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %self.run_id, tasks = graph.len(), "run started");
        self.set_state(ManagerState::Idle);
        let mut last_output: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return self.report(graph, last_output, Some("run cancelled".to_string()));
            }

            let Some(task_id) = graph.next_ready() else {
                if graph.is_complete() {
                    self.set_state(ManagerState::Finalizing);
                    let (long_term, short_term, entity) = self.memory.stats();
                    tracing::info!(long_term, short_term, entity, "run complete, memory stats");
                    return self.report(graph, last_output, None);
                }
                // 有未完成任务却无就绪任务：前置任务失败导致停摆
                return self.report(
                    graph,
                    last_output,
                    Some("no ready task remains but graph is incomplete".to_string()),
                );
            };

            self.set_state(ManagerState::Dispatching);
            match self.dispatch(graph, &task_id, params, &cancel).await {
                Ok(output) => {
                    last_output = Some(output);
                }
                Err(e) => {
                    let _ = graph.mark_failed(&task_id);
                    tracing::warn!(task = %task_id, "task failed: {}", e);
                    return self.report(graph, last_output, Some(format!("task {}: {}", task_id, e)));
                }
            }
        }
    }

    /// 分派单个任务：解析智能体、装配上下文、执行 + 校验，可重试错误按上限重试
    async fn dispatch(
        &mut self,
        graph: &mut TaskGraph,
        task_id: &str,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let task = graph
            .task(task_id)
            .cloned()
            .expect("dispatched task exists in graph");
        let agent = self.registry.resolve(&task)?;
        tracing::info!(task = %task.id, agent = %agent.spec.id, "dispatch");

        let description = interpolate(&task.description, params);
        let mut context = graph.context_for(task_id)?;

        if agent.spec.memory_access {
            let memory_block = self.memory_block(&task, &description);
            if !memory_block.is_empty() {
                context.push_str(&memory_block);
            }
        }

        if let Some(schema_name) = &task.schema {
            if let Some(block) = self.schemas.prompt_block(schema_name) {
                context.push_str(&format!("\n## Output contract\n{}", block));
            }
        }

        graph.mark_running(task_id)?;
        self.set_state(ManagerState::AwaitingResult);

        let mut attempt = 0;
        let mut feedback = String::new();
        loop {
            let full_context = format!("{}{}", context, feedback);
            let outcome = match agent
                .perform(&description, &full_context, &self.executor, cancel)
                .await
            {
                Ok(raw) => self.validate_output(&task, raw),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((result, raw)) => {
                    graph.record_result(task_id, result.clone())?;
                    // 取消时不写入未决结果之外的记忆
                    if agent.spec.memory_access && !cancel.is_cancelled() {
                        self.write_memory(&task, &agent, &result, &raw);
                    }
                    return Ok(result.to_context_text());
                }
                Err(EngineError::Agent(AgentError::Cancelled)) => {
                    return Err(AgentError::Cancelled.into());
                }
                Err(e) if attempt < self.retry_limit && is_retryable(&e) => {
                    tracing::warn!(task = %task.id, attempt, "retrying after: {}", e);
                    feedback = format!(
                        "\n## Previous attempt rejected\n{}\nProduce output that satisfies the contract.\n",
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 有契约的任务校验为结构化结果，无契约的接受自由文本
    fn validate_output(&self, task: &Task, raw: String) -> Result<(TaskResult, String), EngineError> {
        match &task.schema {
            Some(schema_name) => {
                let value = self.schemas.validate(schema_name, &raw)?;
                Ok((TaskResult::Structured(value), raw))
            }
            None => Ok((TaskResult::Text(raw.clone()), raw)),
        }
    }

    /// 检索相关记忆并渲染为上下文段落：长期按任务键（跨 Run 去重），短期/实体按描述
    fn memory_block(&self, task: &Task, description: &str) -> String {
        let mut lines = Vec::new();
        for record in self.memory.query(MemoryKind::LongTerm, &task.id, 3) {
            lines.push(format!("- [long_term] {}", record.content));
        }
        for record in self.memory.query(MemoryKind::ShortTerm, description, 3) {
            lines.push(format!("- [short_term] {}", record.content));
        }
        for record in self.memory.query(MemoryKind::Entity, description, 3) {
            lines.push(format!("- [entity] {}", record.content));
        }
        if lines.is_empty() {
            return String::new();
        }
        format!(
            "\n## Relevant memory\n{}\nAvoid repeating recommendations already made in previous runs.\n",
            lines.join("\n")
        )
    }

    /// 任务成功后的记忆写入：短期存原始输出，长期按任务键存结果，实体存结构化对象；
    /// 每条记录带 task/agent 溯源。写入失败降级为警告，不影响 Run。
    fn write_memory(&self, task: &Task, agent: &Arc<AgentRuntime>, result: &TaskResult, raw: &str) {
        let agent_id = agent.spec.id.as_str();

        let short = MemoryRecord::new(MemoryKind::ShortTerm, raw, task.id.as_str(), agent_id);
        if let Err(e) = self.memory.write(short) {
            tracing::warn!("short-term write degraded: {}", e);
        }

        let long = MemoryRecord::new(
            MemoryKind::LongTerm,
            result.to_context_text(),
            task.id.as_str(),
            agent_id,
        )
        .with_topic(task.id.as_str());
        if let Err(e) = self.memory.write(long) {
            tracing::warn!("long-term write degraded: {}", e);
        }

        if let TaskResult::Structured(value) = result {
            for (name, object) in extract_entities(value) {
                let content = serde_json::to_string(&object).unwrap_or_else(|_| object.to_string());
                let record = MemoryRecord::new(MemoryKind::Entity, content, task.id.as_str(), agent_id)
                    .with_topic(name);
                if let Err(e) = self.memory.write(record) {
                    tracing::warn!("entity write degraded: {}", e);
                }
            }
        }
    }

    fn report(
        &mut self,
        graph: &TaskGraph,
        last_output: Option<String>,
        failure: Option<String>,
    ) -> RunReport {
        let results = graph.results();
        let status = match &failure {
            None => RunStatus::Success,
            Some(_) if !results.is_empty() => RunStatus::Partial,
            Some(_) => RunStatus::Failed,
        };
        if failure.is_some() {
            self.set_state(ManagerState::Failed);
        }
        RunReport {
            run_id: self.run_id.clone(),
            status,
            final_output: last_output,
            results,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSpec;
    use crate::core::ToolError;
    use crate::graph::TaskGraphBuilder;
    use crate::llm::ScriptedCompletionClient;
    use crate::memory::{LongTermStore, VectorStore};
    use crate::schema::{candidate_list_schema, research_list_schema};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingNotify;

    #[async_trait]
    impl Tool for FailingNotify {
        fn name(&self) -> &str {
            "notify"
        }

        fn description(&self) -> &str {
            "notify stub that always fails delivery"
        }

        fn input_schema(&self) -> crate::schema::Schema {
            crate::schema::Schema::new("notify_args").field(crate::schema::SchemaField::required(
                "message",
                crate::schema::FieldType::Text,
                "m",
            ))
        }

        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Err(ToolError::DeliveryFailed("HTTP 500".to_string()))
        }
    }

    fn memory() -> MemoryHandle {
        MemoryHandle::new(
            LongTermStore::open_in_memory().unwrap(),
            VectorStore::new(MemoryKind::ShortTerm, None, 100),
            VectorStore::new(MemoryKind::Entity, None, 100),
        )
    }

    fn schemas() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(candidate_list_schema());
        registry.register(research_list_schema());
        registry
    }

    fn crew_registry(llm: Arc<ScriptedCompletionClient>, max_rounds: usize) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register(AgentRuntime::new(
            AgentSpec::new("manager", "manager", "Coordinate the crew").with_delegation(true),
            llm.clone(),
            max_rounds,
        ));
        registry.register(AgentRuntime::new(
            AgentSpec::new("finder", "trending_company_finder", "Find trending companies")
                .with_memory(true),
            llm.clone(),
            max_rounds,
        ));
        registry.register(AgentRuntime::new(
            AgentSpec::new("researcher", "financial_researcher", "Research trending companies"),
            llm.clone(),
            max_rounds,
        ));
        registry.register(AgentRuntime::new(
            AgentSpec::new("picker", "stock_picker", "Pick the best company")
                .with_tools(vec!["notify"])
                .with_memory(true),
            llm,
            max_rounds,
        ));
        registry
    }

    fn three_task_graph() -> TaskGraph {
        TaskGraphBuilder::new()
            .task(
                Task::new("find", "Find trending companies in {sector}", "trending_company_finder")
                    .with_schema("candidate_list"),
            )
            .task(
                Task::new("research", "Research each trending company", "financial_researcher")
                    .with_schema("research_list")
                    .with_upstream(vec!["find"]),
            )
            .task(
                Task::new("pick", "Pick the best company to invest in", "stock_picker")
                    .with_upstream(vec!["research"]),
            )
            .build()
            .unwrap()
    }

    fn candidate_json() -> String {
        json!({"companies": [{"name": "Acme", "ticker": "ACM", "reason": "earnings beat"}]}).to_string()
    }

    fn research_json() -> String {
        json!({"research_list": [{
            "name": "Acme",
            "market_position": "leader",
            "future_outlook": "strong",
            "investment_potential": "high"
        }]})
        .to_string()
    }

    fn executor_with_notify() -> ToolExecutor {
        let mut tools = ToolRegistry::new();
        tools.register(FailingNotify);
        ToolExecutor::new(tools, 5)
    }

    #[tokio::test]
    async fn test_end_to_end_three_task_run() {
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            candidate_json(),
            research_json(),
            "RECOMMENDATION: Acme — strong fundamentals.".to_string(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();
        let params = RunParams::from([("sector".to_string(), "technology".to_string())]);

        let report = manager.run(&mut graph, &params, CancellationToken::new()).await;

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(
            report.final_output.as_deref(),
            Some("RECOMMENDATION: Acme — strong fundamentals.")
        );
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].0, "find");
        assert_eq!(report.results[1].0, "research");
        assert_eq!(report.results[2].0, "pick");
        assert_eq!(llm.remaining(), 0);
        assert_eq!(manager.state(), ManagerState::Finalizing);
    }

    #[tokio::test]
    async fn test_schema_violation_retried_exactly_once() {
        // 第一次违例，第二次（重试）通过；后续任务照常
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            "I have no structured output, sorry.".to_string(),
            candidate_json(),
            research_json(),
            "RECOMMENDATION: Acme".to_string(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();

        let report = manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_schema_violation_never_retried_twice() {
        // 两次违例后任务失败；第三条脚本必须原样留下，证明没有第二次重试
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            "still prose, attempt one".to_string(),
            "still prose, attempt two".to_string(),
            candidate_json(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();

        let report = manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.failure.as_deref().unwrap_or("").contains("find"));
        assert!(report.results.is_empty());
        assert_eq!(llm.remaining(), 1);
        assert_eq!(manager.state(), ManagerState::Failed);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_fail_run() {
        // picker 先调 notify（投递失败回流为观察），再给最终文本
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            candidate_json(),
            research_json(),
            json!({"tool": "notify", "args": {"message": "RECOMMENDATION: Acme"}}).to_string(),
            "RECOMMENDATION: Acme (push delivery failed)".to_string(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();

        let report = manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;

        assert_eq!(report.status, RunStatus::Success);
        assert!(report.final_output.unwrap().contains("RECOMMENDATION: Acme"));
    }

    #[tokio::test]
    async fn test_partial_report_keeps_validated_results() {
        // find 成功；research 两次违例 -> Run 部分失败，find 的结果仍在报告中
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            candidate_json(),
            "prose attempt one".to_string(),
            "prose attempt two".to_string(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();

        let report = manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].0, "find");
        // best-effort 答案是最后完成任务的结果
        assert!(report.final_output.unwrap().contains("Acme"));
    }

    #[tokio::test]
    async fn test_memory_written_with_provenance_after_success() {
        let llm = Arc::new(ScriptedCompletionClient::new(vec![
            candidate_json(),
            research_json(),
            "RECOMMENDATION: Acme".to_string(),
        ]));
        let mut manager = Manager::new(
            crew_registry(llm, 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();
        manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;

        // finder 与 picker 有记忆权限，researcher 没有
        let (long_term, short_term, entity) = manager.memory().stats();
        assert_eq!(long_term, 2);
        assert_eq!(short_term, 2);
        // find 的结构化结果含一个实体 Acme
        assert_eq!(entity, 1);

        let decisions = manager.memory().query(MemoryKind::LongTerm, "pick", 5);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].agent_id, "picker");
        assert_eq!(decisions[0].task_id, "pick");
    }

    #[tokio::test]
    async fn test_delegation_reroutes_unmatched_role() {
        let mut graph = TaskGraphBuilder::new()
            .task(
                // 没有叫 market_analyst 的智能体；经 manager 委派给 researcher
                Task::new("analyze", "Research trending companies fundamentals", "market_analyst")
                    .with_schema("research_list"),
            )
            .build()
            .unwrap();
        let llm = Arc::new(ScriptedCompletionClient::new(vec![research_json()]));
        let mut manager = Manager::new(
            crew_registry(llm, 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );

        let report = manager
            .run(&mut graph, &RunParams::new(), CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let llm = Arc::new(ScriptedCompletionClient::new(vec![candidate_json()]));
        let mut manager = Manager::new(
            crew_registry(llm.clone(), 4),
            schemas(),
            executor_with_notify(),
            memory(),
        );
        let mut graph = three_task_graph();

        let report = manager.run(&mut graph, &RunParams::new(), cancel).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(llm.remaining(), 1);
        assert_eq!(manager.memory().stats(), (0, 0, 0));
    }

    #[test]
    fn test_interpolate_params() {
        let params = RunParams::from([
            ("sector".to_string(), "technology".to_string()),
            ("region".to_string(), "Africa".to_string()),
        ]);
        assert_eq!(
            interpolate("Find companies in {sector} ({region})", &params),
            "Find companies in technology (Africa)"
        );
    }

    #[test]
    fn test_extract_entities_recursive() {
        let value = json!({
            "companies": [
                {"name": "Acme", "ticker": "ACM"},
                {"name": "Globex", "ticker": "GLX"}
            ]
        });
        let entities = extract_entities(&value);
        let names: Vec<&str> = entities.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Globex"]);
    }
}
