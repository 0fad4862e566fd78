//! 推理步骤与最终响应

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 一轮 Thought -> Action -> Observation；产生后只追加到历史中，不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningStep {
    pub thought: String,
    pub action: Option<String>,
    #[serde(default)]
    pub action_input: Map<String, Value>,
    pub observation: Option<String>,
    pub is_final_answer: bool,
    /// 仅当 is_final_answer 时存在
    pub final_answer: Option<String>,
}

impl ReasoningStep {
    pub fn final_answer(thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            is_final_answer: true,
            final_answer: Some(answer.into()),
            ..Self::default()
        }
    }

    pub fn action(
        thought: impl Into<String>,
        action: Option<String>,
        action_input: Map<String, Value>,
    ) -> Self {
        Self {
            thought: thought.into(),
            action,
            action_input,
            ..Self::default()
        }
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = Some(observation.into());
        self
    }
}

/// 推理循环的最终输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    /// 产生最终答案的那一步的思考
    pub thought: String,
    pub steps: Vec<ReasoningStep>,
}

impl AgentResponse {
    pub fn iterations(&self) -> usize {
        self.steps.len()
    }
}
