//! 请求上下文：会话 / 项目 / 父任务 ID 沿调用链显式传递

use serde::{Deserialize, Serialize};

/// 一次请求的上下文记录，每个调用边界都显式传入
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// 会话 ID；为空时推理循环不写入对话存储
    pub conversation_id: Option<String>,
    pub project_id: Option<String>,
    /// 父任务 ID（根请求为空）
    pub parent_task_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_parent_task(mut self, task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(task_id.into());
        self
    }

    /// 派生子任务上下文：保留会话与项目，父任务改为 task_id
    pub fn child(&self, task_id: &str) -> Self {
        Self {
            conversation_id: self.conversation_id.clone(),
            project_id: self.project_id.clone(),
            parent_task_id: Some(task_id.to_string()),
        }
    }
}
