//! 智能体注册表
//!
//! 能力标签 -> 智能体实例的数据驱动映射，Manager 按标签查找，不依赖类型层级。
//! 标签无精确匹配且存在 allow_delegation 的智能体时，按角色描述词重叠把任务
//! 再路由到最合适的具体智能体；这层间接使层级流程区别于固定流水线。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AgentRuntime;
use crate::core::EngineError;
use crate::graph::Task;

fn tokenize_lower(s: &str) -> std::collections::HashSet<String> {
    s.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 注册表：按能力标签存储共享运行时，注册顺序保证平分时选择确定
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<AgentRuntime>>,
    /// 注册顺序
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runtime: AgentRuntime) {
        let role = runtime.spec.role.clone();
        if !self.agents.contains_key(&role) {
            self.order.push(role.clone());
        }
        self.agents.insert(role, Arc::new(runtime));
    }

    pub fn get(&self, role: &str) -> Option<Arc<AgentRuntime>> {
        self.agents.get(role).cloned()
    }

    pub fn roles(&self) -> Vec<String> {
        self.order.clone()
    }

    fn in_order(&self) -> impl Iterator<Item = &Arc<AgentRuntime>> {
        self.order.iter().map(|role| &self.agents[role])
    }

    /// 为任务解析执行者：能力标签精确匹配优先；无匹配时经可委派智能体再路由
    pub fn resolve(&self, task: &Task) -> Result<Arc<AgentRuntime>, EngineError> {
        if let Some(agent) = self.get(&task.required_role) {
            return Ok(agent);
        }

        // 角色不明确：需要有可委派者才允许再路由
        let delegator = self
            .in_order()
            .find(|a| a.spec.allow_delegation)
            .ok_or_else(|| EngineError::NoEligibleAgent(task.required_role.clone()))?;

        let task_tokens = tokenize_lower(&format!("{} {}", task.required_role, task.description));
        let best = self
            .in_order()
            .filter(|a| !a.spec.allow_delegation)
            .map(|a| {
                let agent_tokens = tokenize_lower(&format!("{} {}", a.spec.role, a.spec.goal));
                (task_tokens.intersection(&agent_tokens).count(), a)
            })
            .filter(|(score, _)| *score > 0)
            .max_by_key(|(score, _)| *score)
            .map(|(score, a)| (score, a.clone()));

        match best {
            Some((score, agent)) => {
                tracing::info!(
                    delegator = %delegator.spec.id,
                    task_role = %task.required_role,
                    to = %agent.spec.id,
                    score,
                    "delegation re-route"
                );
                Ok(agent)
            }
            None => Err(EngineError::NoEligibleAgent(task.required_role.clone())),
        }
    }
}
