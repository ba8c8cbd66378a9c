//! 任务图构建器
//!
//! 流畅 API 收集任务，build 时做全部构造期校验：重复 ID、未知上游、环
//! （Kahn 入度算法）。校验通过后的图在运行期不会再遇到这些错误。

use std::collections::HashMap;

use crate::core::GraphError;
use crate::graph::dag::TaskGraph;
use crate::graph::types::Task;

/// 任务图构建器
#[derive(Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加任务（依赖在 Task::with_upstream 上声明）
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// 校验并构建；任何一项不满足都返回 GraphError，Run 不会开始
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        if self.tasks.is_empty() {
            return Err(GraphError::InvalidGraph("graph has no tasks".to_string()));
        }

        // 重复 ID
        let mut ids = std::collections::HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.id.clone()) {
                return Err(GraphError::DuplicateTask(task.id.clone()));
            }
        }

        // 未知上游
        for task in &self.tasks {
            for dep in &task.upstream {
                if !ids.contains(dep) {
                    return Err(GraphError::UnknownTask(dep.clone()));
                }
            }
        }

        // Kahn 拓扑排序检测环：能完整剥离所有节点则无环
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.upstream.len()))
            .collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            for dep in &task.upstream {
                adjacency.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
        }

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;
        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(dependents) = adjacency.get(id) {
                for dependent in dependents {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(*dependent);
                    }
                }
            }
        }
        if visited != self.tasks.len() {
            return Err(GraphError::CycleDetected);
        }

        Ok(TaskGraph::from_validated(self.tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_valid_graph() {
        let graph = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r"))
            .task(Task::new("b", "B", "r").with_upstream(vec!["a"]))
            .build()
            .unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_cycle_is_construction_error() {
        let err = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r").with_upstream(vec!["b"]))
            .task(Task::new("b", "B", "r").with_upstream(vec!["a"]))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::CycleDetected);
    }

    #[test]
    fn test_self_cycle_detected() {
        let err = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r").with_upstream(vec!["a"]))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::CycleDetected);
    }

    #[test]
    fn test_unknown_upstream_rejected() {
        let err = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r").with_upstream(vec!["ghost"]))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownTask("ghost".to_string()));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let err = TaskGraphBuilder::new()
            .task(Task::new("a", "A", "r"))
            .task(Task::new("a", "again", "r"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask("a".to_string()));
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(TaskGraphBuilder::new().build().is_err());
    }
}
