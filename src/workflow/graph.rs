//! 工作流依赖图
//!
//! 每轮调度的就绪计算，以及死锁时的诊断（未知依赖、环）。
//! 环检测用邻接表 + 入度表做拓扑排序，排不出去的步骤即在环上或依赖环。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::workflow::types::*;

/// 一轮调度的判定结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    /// Pending 且依赖全部 Done 的步骤，保持定义顺序
    pub runnable: Vec<StepId>,
    /// 全部步骤 Done/Skipped
    pub complete: bool,
    pub any_failed: bool,
    pub any_running: bool,
}

/// 计算当前可运行步骤与整体状态
pub fn evaluate(workflow: &Workflow) -> Schedule {
    let status_of: HashMap<&str, StepStatus> = workflow
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.status))
        .collect();

    let runnable = workflow
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter(|s| {
            s.depends_on
                .iter()
                .all(|dep| status_of.get(dep.as_str()) == Some(&StepStatus::Done))
        })
        .map(|s| s.id.clone())
        .collect();

    Schedule {
        runnable,
        complete: workflow
            .steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Done | StepStatus::Skipped)),
        any_failed: workflow.steps.iter().any(|s| s.status == StepStatus::Failed),
        any_running: workflow.steps.iter().any(|s| s.status == StepStatus::Running),
    }
}

/// 工作流依赖图
pub struct WorkflowGraph {
    /// 邻接表：步骤 ID -> 依赖该步骤的步骤列表
    pub adjacency: HashMap<StepId, Vec<StepId>>,
    /// 入度表：步骤 ID -> 已知依赖数
    pub in_degree: HashMap<StepId, usize>,
    /// (步骤, 不存在的依赖)
    pub unknown: Vec<(StepId, StepId)>,
}

impl WorkflowGraph {
    pub fn new(steps: &[WorkflowStep]) -> Self {
        let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        let mut adjacency: HashMap<StepId, Vec<StepId>> = HashMap::new();
        let mut in_degree: HashMap<StepId, usize> = HashMap::new();
        let mut unknown = Vec::new();

        for step in steps {
            in_degree.entry(step.id.clone()).or_insert(0);
            adjacency.entry(step.id.clone()).or_default();
        }

        for step in steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    unknown.push((step.id.clone(), dep.clone()));
                    continue;
                }
                adjacency.entry(dep.clone()).or_default().push(step.id.clone());
                *in_degree.entry(step.id.clone()).or_insert(0) += 1;
            }
        }

        Self {
            adjacency,
            in_degree,
            unknown,
        }
    }

    /// 拓扑排序后仍有剩余入度的步骤（在环上或下游依赖环），按 ID 排序
    pub fn cyclic_steps(&self) -> Vec<StepId> {
        let mut degree = self.in_degree.clone();
        let mut queue: VecDeque<StepId> = degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();

        while let Some(id) = queue.pop_front() {
            if let Some(dependents) = self.adjacency.get(&id) {
                for dependent in dependents {
                    if let Some(d) = degree.get_mut(dependent) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        let mut stuck: Vec<StepId> = degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id)
            .collect();
        stuck.sort();
        stuck
    }
}

/// 死锁原因描述，固定以 `deadlock:` 开头
pub fn deadlock_reason(workflow: &Workflow) -> String {
    let graph = WorkflowGraph::new(&workflow.steps);
    let mut parts = Vec::new();

    if !graph.unknown.is_empty() {
        let list: Vec<String> = graph
            .unknown
            .iter()
            .map(|(step, dep)| format!("'{}' -> '{}'", step, dep))
            .collect();
        parts.push(format!("unknown dependencies {}", list.join(", ")));
    }

    let cyclic = graph.cyclic_steps();
    if !cyclic.is_empty() {
        parts.push(format!("cyclic dependencies among [{}]", cyclic.join(", ")));
    }

    if parts.is_empty() {
        let blocked: Vec<&str> = workflow
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.id.as_str())
            .collect();
        parts.push(format!(
            "steps [{}] wait on dependencies that can no longer finish",
            blocked.join(", ")
        ));
    }

    format!("deadlock: no runnable or running steps; {}", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wf(steps: Vec<WorkflowStep>) -> Workflow {
        crate::workflow::WorkflowBuilder::new("g")
            .steps(steps)
            .build()
            .unwrap()
    }

    #[test]
    fn runnable_respects_dependencies() {
        let mut w = wf(vec![
            WorkflowStep::new("a", "default", "x"),
            WorkflowStep::new("b", "default", "x").depends_on(&["a"]),
            WorkflowStep::new("c", "default", "x"),
        ]);
        let s = evaluate(&w);
        assert_eq!(s.runnable, vec!["a", "c"]);
        assert!(!s.complete && !s.any_failed && !s.any_running);

        w.steps[0].status = StepStatus::Running;
        let s = evaluate(&w);
        assert_eq!(s.runnable, vec!["c"]);
        assert!(s.any_running);

        w.steps[0].status = StepStatus::Done;
        w.steps[2].status = StepStatus::Done;
        assert_eq!(evaluate(&w).runnable, vec!["b"]);
    }

    #[test]
    fn unknown_dependency_never_runnable() {
        let w = wf(vec![WorkflowStep::new("a", "default", "x").depends_on(&["ghost"])]);
        assert!(evaluate(&w).runnable.is_empty());
        let reason = deadlock_reason(&w);
        assert!(reason.starts_with("deadlock:"));
        assert!(reason.contains("'a' -> 'ghost'"));
    }

    #[test]
    fn cycle_is_named() {
        let w = wf(vec![
            WorkflowStep::new("a", "default", "x").depends_on(&["b"]),
            WorkflowStep::new("b", "default", "x").depends_on(&["a"]),
            WorkflowStep::new("c", "default", "x"),
        ]);
        let graph = WorkflowGraph::new(&w.steps);
        assert_eq!(graph.cyclic_steps(), vec!["a", "b"]);
        assert_eq!(graph.in_degree.get("c"), Some(&0));
        assert!(deadlock_reason(&w).contains("cyclic dependencies among [a, b]"));
    }
}
