//! 工作流构建器
//!
//! 提供流畅的API来构建工作流

use std::collections::BTreeMap;

use crate::workflow::types::*;

/// 工作流构建器
pub struct WorkflowBuilder {
    id: WorkflowId,
    name: String,
    description: Option<String>,
    project_id: Option<String>,
    steps: Vec<WorkflowStep>,
}

impl WorkflowBuilder {
    /// 创建新的工作流构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("wf_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: None,
            project_id: None,
            steps: Vec::new(),
        }
    }

    /// 指定工作流 ID（默认随机生成）
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// 追加步骤（定义顺序即同一批次内的执行顺序）
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = WorkflowStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// 构建工作流，状态为 Pending
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let workflow = Workflow {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            steps: self.steps,
            state: BTreeMap::new(),
            status: WorkflowStatus::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            completed_at: None,
            error: None,
            paused_on: None,
        };
        workflow.validate()?;
        Ok(workflow)
    }
}
