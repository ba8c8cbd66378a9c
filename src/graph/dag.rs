//! 任务依赖图
//!
//! 上游列表定义的 DAG；就绪判定（上游全部 done）、结果记录（恰好一次）与
//! 依赖序上下文装配。环与未知依赖在构造期拒绝（见 builder），运行期不出现。

use std::collections::HashMap;

use crate::core::GraphError;
use crate::graph::types::{Task, TaskId, TaskResult, TaskStatus};

/// 任务图：插入序保存任务，就绪扫描与上下文装配都按确定顺序进行
#[derive(Debug)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Task>,
    /// 插入顺序
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// 仅供 builder 在校验（重复 / 未知依赖 / 环）通过后调用
    pub(crate) fn from_validated(tasks: Vec<Task>) -> Self {
        let order: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        let tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { tasks, order }
    }

    fn upstream_done(&self, task: &Task) -> bool {
        task.upstream
            .iter()
            .all(|dep| matches!(self.tasks.get(dep).map(|t| t.status), Some(TaskStatus::Done)))
    }

    /// 下一个可分派的任务：上游全部 done 且自身 pending/ready；同时将其提升为 Ready
    pub fn next_ready(&mut self) -> Option<TaskId> {
        let candidate = self.order.iter().find(|id| {
            let task = &self.tasks[*id];
            matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) && self.upstream_done(task)
        })?;
        let id = candidate.clone();
        self.tasks.get_mut(&id).unwrap().status = TaskStatus::Ready;
        Some(id)
    }

    pub fn mark_running(&mut self, id: &str) -> Result<(), GraphError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        task.status = TaskStatus::Running;
        Ok(())
    }

    /// 记录结果并进入 done；done 只进入一次，重复写入被拒绝
    pub fn record_result(&mut self, id: &str, result: TaskResult) -> Result<(), GraphError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        if task.status == TaskStatus::Done {
            return Err(GraphError::AlreadyRecorded(id.to_string()));
        }
        task.result = Some(result);
        task.status = TaskStatus::Done;
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &str) -> Result<(), GraphError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        task.status = TaskStatus::Failed;
        Ok(())
    }

    /// 全部任务 done
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.status == TaskStatus::Done)
    }

    /// 按上游列表顺序装配已校验结果，供下游任务作为上下文
    pub fn context_for(&self, id: &str) -> Result<String, GraphError> {
        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
        let mut context = String::new();
        for dep_id in &task.upstream {
            let dep = self
                .tasks
                .get(dep_id)
                .ok_or_else(|| GraphError::UnknownTask(dep_id.to_string()))?;
            if let Some(result) = &dep.result {
                context.push_str(&format!(
                    "## Result of task `{}` ({})\n{}\n\n",
                    dep.id,
                    dep.description,
                    result.to_context_text()
                ));
            }
        }
        Ok(context)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks_in_order(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|id| &self.tasks[id])
    }

    /// 已完成任务的 (id, result)，按插入顺序
    pub fn results(&self) -> Vec<(TaskId, TaskResult)> {
        self.tasks_in_order()
            .filter_map(|t| t.result.clone().map(|r| (t.id.clone(), r)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
