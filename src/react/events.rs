//! ReAct 过程事件：用于把每轮思考、工具调用与观察实时推给调用方

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 本轮解析出的思考（非空时才发送）
    Thought { iteration: usize, thought: String },
    /// 调用工具
    ToolCall {
        iteration: usize,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        iteration: usize,
        tool: Option<String>,
        preview: String,
    },
    /// 最终答案
    FinalAnswer { answer: String },
}
