//! Run 装配与入口
//!
//! 从 AppConfig 构建一次 Run 所需的全部组件：长期/向量记忆（打开失败致命）、
//! 工具箱、完成客户端与智能体注册表，然后把任务图交给 Manager 执行；
//! Run 结束时落盘记忆并输出 token 统计。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{AgentRuntime, AgentSpec};
use crate::config::AppConfig;
use crate::llm::{
    create_embedder_from_config, CompletionClient, MockCompletionClient, OpenAiClient,
};
use crate::manager::{AgentRegistry, Manager, RunParams, RunReport};
use crate::memory::MemoryHandle;
use crate::schema::{Schema, SchemaRegistry};
use crate::tools::{PushTool, SearchTool, ToolExecutor, ToolRegistry};

/// 按配置选择完成后端：openai（有 API Key 时）或 Mock
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn CompletionClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false);

    if provider == "openai" && has_key {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
            cfg.llm.timeouts.request,
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockCompletionClient)
    }
}

/// 编排器：注册 Schema 与智能体配置，kickoff 消费自身执行一次 Run
pub struct Orchestrator {
    config: AppConfig,
    agents: Vec<AgentSpec>,
    schemas: SchemaRegistry,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            agents: Vec::new(),
            schemas: SchemaRegistry::new(),
        }
    }

    pub fn register_schema(&mut self, schema: Schema) {
        self.schemas.register(schema);
    }

    pub fn register_agent(&mut self, spec: AgentSpec) {
        self.agents.push(spec);
    }

    /// 执行一次 Run（新取消令牌）
    pub async fn kickoff(
        self,
        graph_builder: crate::graph::TaskGraphBuilder,
        params: RunParams,
    ) -> anyhow::Result<RunReport> {
        self.kickoff_with_cancel(graph_builder, params, CancellationToken::new())
            .await
    }

    /// 执行一次 Run；cancel 触发时传播到进行中的完成与工具调用，且不写入未决记忆
    pub async fn kickoff_with_cancel(
        self,
        graph_builder: crate::graph::TaskGraphBuilder,
        params: RunParams,
        cancel: CancellationToken,
    ) -> anyhow::Result<RunReport> {
        let cfg = &self.config;

        // 环在构造期拒绝，Run 不会开始
        let mut graph = graph_builder.build()?;

        // 长期库打开失败在此致命；向量存储随句柄加载
        let embedder = create_embedder_from_config(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.embedding_model,
            None,
        );
        let memory = MemoryHandle::open(cfg.app.memory_dir(), embedder)?;

        let mut tools = ToolRegistry::new();
        tools.register(SearchTool::new(
            cfg.tools.search.endpoint.clone(),
            cfg.tools.search.timeout_secs,
            cfg.tools.search.max_results,
        ));
        tools.register(PushTool::from_env(cfg.tools.notify.timeout_secs));
        let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);

        let llm = create_llm_from_config(cfg);
        let mut registry = AgentRegistry::new();
        for spec in &self.agents {
            registry.register(AgentRuntime::new(
                spec.clone(),
                llm.clone(),
                cfg.manager.max_tool_rounds,
            ));
        }

        let mut manager = Manager::new(registry, self.schemas, executor, memory)
            .with_retry_limit(cfg.manager.schema_retry_limit);

        let report = manager.run(&mut graph, &params, cancel).await;

        manager.memory().flush()?;
        let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
        tracing::info!(prompt_tokens, completion_tokens, total_tokens, "run token usage");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Task, TaskGraphBuilder};

    #[tokio::test]
    async fn test_cycle_rejected_before_run_starts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.app.memory_dir = Some(dir.path().to_path_buf());

        let orchestrator = Orchestrator::new(cfg);
        let builder = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r").with_upstream(vec!["b"]))
            .task(Task::new("b", "B", "r").with_upstream(vec!["a"]));

        let err = orchestrator.kickoff(builder, RunParams::new()).await.unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }
}
