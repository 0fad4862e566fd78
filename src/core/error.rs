//! Agent 错误类型
//!
//! 按传播范围划分：工具失败在循环内转为 Observation；LLM 失败、人格解析失败、步数耗尽终止本次调用；
//! 持久化失败记录日志，由下一次 reload 重新推导权威状态。

use thiserror::Error;

use crate::react::ReasoningStep;

/// 存储层错误（人格 / 对话 / 工作流存储共用）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 工具存在，但不在当前人格的允许列表内
    #[error("Tool not allowed: {0}")]
    ToolNotAllowed(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 步数耗尽仍无 Final Answer；steps 保留已产生的推理步骤供诊断
    #[error("max iterations reached ({max}) without a final answer")]
    IterationLimitExceeded {
        max: usize,
        steps: Vec<ReasoningStep>,
    },

    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    #[error("delegate requires at least one task")]
    EmptyDelegation,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 步数耗尽时返回部分推理历史，其他错误返回 None
    pub fn partial_steps(&self) -> Option<&[ReasoningStep]> {
        match self {
            AgentError::IterationLimitExceeded { steps, .. } => Some(steps),
            _ => None,
        }
    }
}
