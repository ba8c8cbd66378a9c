//! Hive - 层级式多智能体选股示例
//!
//! 入口：初始化日志、加载配置，装配三个执行智能体 + 可委派 Manager 与三个任务
//! （找热门公司 -> 逐家研究 -> 选出最佳），以 {sector, region} 为输入执行一次 Run
//! 并打印最终决策；Run 失败时以非零码退出。

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hive::agent::AgentSpec;
use hive::config::load_config;
use hive::graph::{Task, TaskGraphBuilder};
use hive::manager::{RunParams, RunStatus};
use hive::schema::{candidate_list_schema, research_list_schema};
use hive::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).context("Failed to load config")?;
    let mut orchestrator = Orchestrator::new(cfg);

    orchestrator.register_schema(candidate_list_schema());
    orchestrator.register_schema(research_list_schema());

    // 可委派的 Manager：角色不明确的任务由它再路由到具体智能体
    orchestrator.register_agent(
        AgentSpec::new("manager", "manager", "Coordinate the crew and delegate work to the right specialist")
            .with_backstory("You run a team of financial agents and always pick the best member for each job.")
            .with_delegation(true),
    );
    orchestrator.register_agent(
        AgentSpec::new(
            "trending_company_finder",
            "trending_company_finder",
            "Find companies that are trending in the news",
        )
        .with_backstory("You scan financial news and spot companies gaining attention before others do.")
        .with_tools(vec!["search"])
        .with_memory(true),
    );
    orchestrator.register_agent(
        AgentSpec::new(
            "financial_researcher",
            "financial_researcher",
            "Research each trending company and analyze market position, outlook and investment potential",
        )
        .with_backstory("You are a thorough analyst who works strictly from the evidence in context.")
        .with_tools(vec!["search"]),
    );
    orchestrator.register_agent(
        AgentSpec::new(
            "stock_picker",
            "stock_picker",
            "Pick the single best company to invest in and notify the user",
        )
        .with_backstory("You weigh research carefully, commit to one recommendation and never repeat a past pick.")
        .with_tools(vec!["notify"])
        .with_memory(true),
    );

    let graph = TaskGraphBuilder::new()
        .task(
            Task::new(
                "find_trending_companies",
                "Find 2-3 companies trending in today's {sector} news in {region}. \
                 Do not include companies recommended in previous runs.",
                "trending_company_finder",
            )
            .with_schema("candidate_list"),
        )
        .task(
            Task::new(
                "research_trending_companies",
                "Research each trending company from the context: market position, \
                 future outlook and investment potential.",
                "financial_researcher",
            )
            .with_schema("research_list")
            .with_upstream(vec!["find_trending_companies"]),
        )
        .task(
            Task::new(
                "pick_best_company",
                "Pick the single best company to invest in based on the research. \
                 Send the user a push notification with the decision, then write a short report.",
                "stock_picker",
            )
            .with_upstream(vec!["research_trending_companies"]),
        );

    let params = RunParams::from([
        ("sector".to_string(), "technology".to_string()),
        ("region".to_string(), "Africa".to_string()),
    ]);

    let report = orchestrator.kickoff(graph, params).await.context("Run failed")?;

    println!("\n\n=== FINAL DECISION ===\n");
    println!("{}", report.final_output.as_deref().unwrap_or("(no output)"));

    match report.status {
        RunStatus::Success => Ok(()),
        RunStatus::Partial | RunStatus::Failed => {
            eprintln!(
                "Run did not complete: {}",
                report.failure.as_deref().unwrap_or("unknown failure")
            );
            std::process::exit(1);
        }
    }
}
