//! Mock LLM 客户端（用于测试与演示，无需 API）
//!
//! - MockLlmClient：直接把 prompt 中最后一个 Question 作为 Final Answer 回显
//! - ScriptedLlmClient：由闭包根据 prompt / model 决定回复，并记录每次调用

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::LlmClient;

/// 从 prompt 中取出最后一个 `Question:` 行之后的内容（即本轮用户输入）
pub fn question_of(prompt: &str) -> &str {
    prompt
        .rfind("\nQuestion: ")
        .map(|i| &prompt[i + "\nQuestion: ".len()..])
        .map(|rest| rest.split("\n\n").next().unwrap_or(rest))
        .unwrap_or("")
        .trim()
}

/// Mock 客户端：回显用户问题
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _model: Option<&str>) -> Result<String, String> {
        let question = question_of(prompt);
        let question = if question.is_empty() { "(no input)" } else { question };
        Ok(format!(
            "Thought: I can answer directly.\nFinal Answer: Echo from Mock: {}",
            question
        ))
    }
}

type Responder = dyn Fn(&str, Option<&str>) -> Result<String, String> + Send + Sync;

/// 一次 LLM 调用记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub model: Option<String>,
}

/// 脚本化客户端：回复由闭包决定，所有调用按顺序记录
#[derive(Clone)]
pub struct ScriptedLlmClient {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedLlmClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 按顺序依次返回给定回复；用完后返回错误
    pub fn sequence(replies: Vec<String>) -> Self {
        let queue = Arc::new(Mutex::new(std::collections::VecDeque::from(replies)));
        Self::new(move |_, _| {
            queue
                .lock()
                .map_err(|_| "script poisoned".to_string())?
                .pop_front()
                .ok_or_else(|| "script exhausted".to_string())
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                model: model.map(str::to_string),
            });
        }
        // 让出一次调度，模拟真实 I/O 的挂起点
        tokio::task::yield_now().await;
        (self.responder)(prompt, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_is_last_block() {
        let prompt = "Preamble\nQuestion: first\n\nhistory\nQuestion: second one\n\nThought:";
        assert_eq!(question_of(prompt), "second one");
    }

    #[tokio::test]
    async fn sequence_runs_out() {
        let llm = ScriptedLlmClient::sequence(vec!["a".into()]);
        assert_eq!(llm.complete("p", Some("m")).await.unwrap(), "a");
        assert!(llm.complete("p", None).await.is_err());
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model.as_deref(), Some("m"));
    }
}
