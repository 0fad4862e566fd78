//! 子 Agent 任务类型

use serde::{Deserialize, Serialize};

use crate::react::ReasoningStep;

/// 子 Agent 任务状态：Pending -> Running -> {Done, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }
}

/// 委派输入：人格引用（名称或 ID）+ 提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateTaskSpec {
    pub persona: String,
    pub prompt: String,
}

impl DelegateTaskSpec {
    pub fn new(persona: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            prompt: prompt.into(),
        }
    }
}

/// 子 Agent 任务：运行期间保存在编排器的活跃表中，结束后仅作为返回值存在
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentTask {
    pub id: String,
    /// 父任务 ID（根请求为空）
    pub parent_task_id: Option<String>,
    pub conversation_id: Option<String>,
    pub persona_id: Option<String>,
    pub persona_name: Option<String>,
    pub model: Option<String>,
    pub input: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<ReasoningStep>,
    /// 毫秒时间戳
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl SubAgentTask {
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_task_id: None,
            conversation_id: None,
            persona_id: None,
            persona_name: None,
            model: None,
            input: input.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            steps: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn mark_done(&mut self, result: String) {
        self.status = TaskStatus::Done;
        self.result = Some(result);
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// 用于通知与工具返回的精简视图
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "task_id": self.id,
            "parent_task_id": self.parent_task_id,
            "persona": self.persona_name,
            "model": self.model,
            "status": self.status.as_str(),
            "result": self.result,
            "error": self.error,
        })
    }
}
