//! 工作流类型定义
//!
//! 工作流、步骤、中断规则、步骤结果与状态枚举

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::StoreError;

pub type WorkflowId = String;
pub type StepId = String;

/// 工作流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// 已提交，尚未启动
    Pending,
    Running,
    /// 等待人工恢复
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

/// 步骤前/后暂停，等待人工确认
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptRule {
    #[serde(default)]
    pub before: bool,
    #[serde(default)]
    pub after: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// 暂停点：步骤执行前还是完成后
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePoint {
    Before,
    After,
}

/// 当前暂停在哪个步骤，供人工确认时展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub step_id: StepId,
    pub point: PausePoint,
    #[serde(default)]
    pub message: Option<String>,
}

/// 步骤产出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub output: String,
    /// duration_ms / iterations / persona 等
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// 工作流中的一个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub persona_id: String,
    /// 提示模板，可引用 `{{state.<stepId>}}`
    pub prompt: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default)]
    pub interrupt: Option<InterruptRule>,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<StepResult>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    /// before 中断已被 resume 确认，下次调度直接执行
    #[serde(default)]
    pub approved: bool,
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        persona_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            persona_id: persona_id.into(),
            prompt: prompt.into(),
            allowed_tools: Vec::new(),
            depends_on: Vec::new(),
            interrupt: None,
            status: StepStatus::Pending,
            result: None,
            started_at: None,
            finished_at: None,
            error: None,
            approved: false,
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.allowed_tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    /// 执行前暂停
    pub fn interrupt_before(mut self, message: impl Into<String>) -> Self {
        let rule = self.interrupt.get_or_insert_with(InterruptRule::default);
        rule.before = true;
        rule.message = Some(message.into());
        self
    }

    /// 完成后暂停
    pub fn interrupt_after(mut self, message: impl Into<String>) -> Self {
        let rule = self.interrupt.get_or_insert_with(InterruptRule::default);
        rule.after = true;
        rule.message = Some(message.into());
        self
    }

    /// 尚未被确认的 before 中断
    pub fn pauses_before(&self) -> bool {
        !self.approved && self.interrupt.as_ref().is_some_and(|r| r.before)
    }

    pub fn pauses_after(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|r| r.after)
    }

    pub fn interrupt_message(&self) -> Option<String> {
        self.interrupt.as_ref().and_then(|r| r.message.clone())
    }

    pub fn output(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.output.as_str())
    }
}

/// 工作流定义与运行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
    /// 步骤 ID -> 步骤输出，供后续步骤插值
    #[serde(default)]
    pub state: BTreeMap<String, String>,
    pub status: WorkflowStatus,
    pub created_at: i64,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub paused_on: Option<PauseInfo>,
}

impl Workflow {
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// 提交前的结构校验：至少一个步骤、步骤 ID 非空且唯一。
    /// 未知或成环的依赖不在这里拒绝，运行时以 deadlock 失败。
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidConfiguration(
                "workflow has no steps".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(WorkflowError::InvalidConfiguration(
                    "step id must not be empty".to_string(),
                ));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(WorkflowError::InvalidConfiguration(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }
        Ok(())
    }

    /// 转入终态并记录完成时间
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<String>) {
        self.status = status;
        self.paused_on = None;
        self.error = error;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 在某个步骤处暂停
    pub fn pause_at(&mut self, step_id: &str, point: PausePoint) {
        let message = self.step(step_id).and_then(WorkflowStep::interrupt_message);
        self.status = WorkflowStatus::Paused;
        self.paused_on = Some(PauseInfo {
            step_id: step_id.to_string(),
            point,
            message,
        });
    }

    /// 根据步骤状态收敛工作流状态，返回是否发生转换。
    ///
    /// 任一步骤失败 -> Failed；全部 Done/Skipped -> Completed；
    /// 全部终态但含 Cancelled -> Failed。已是终态的工作流不变。
    pub fn reconcile(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if let Some(failed) = self.steps.iter().find(|s| s.status == StepStatus::Failed) {
            let reason = format!(
                "step '{}' failed: {}",
                failed.id,
                failed.error.as_deref().unwrap_or("unknown error")
            );
            self.finish(WorkflowStatus::Failed, Some(reason));
            return true;
        }
        if !self.steps.iter().all(|s| s.status.is_terminal()) {
            return false;
        }
        if self
            .steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Done | StepStatus::Skipped))
        {
            self.finish(WorkflowStatus::Completed, None);
        } else {
            self.finish(
                WorkflowStatus::Failed,
                Some("workflow ended with cancelled steps".to_string()),
            );
        }
        true
    }
}

/// 工作流错误类型
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),
    #[error("Cannot {action} workflow {id} in status {from}")]
    InvalidTransition {
        id: String,
        from: WorkflowStatus,
        action: &'static str,
    },
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Workflow storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            other => WorkflowError::Storage(other),
        }
    }
}
