//! ReAct 主循环
//!
//! 拼 prompt -> 调用 LLM -> 解析为 ReasoningStep ->
//! 若为 Final Answer 则写入对话并返回；否则执行工具，把模型输出与 Observation 追加到循环内记录，进入下一轮。
//! 工具失败只作为 Observation 反馈给模型，不会中止循环；步数耗尽返回 IterationLimitExceeded。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RequestContext};
use crate::llm::LlmClient;
use crate::memory::{format_history, ConversationStore, Message};
use crate::persona::Persona;
use crate::react::prompt::{build_prompt, strip_fabricated_observation, PromptParts, DEFAULT_IDENTITY};
use crate::react::{parse_react_output, AgentResponse, ReactEvent, ReasoningStep};
use crate::tools::{observation_text, ToolExecutor, ToolFilter};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

const FORMAT_REMINDER: &str = "Error: no Action or Final Answer found. Reply with 'Action:' and 'Action Input:', or with 'Final Answer:'.";

/// 单次运行参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_iterations: usize,
    /// 固定使用的模型 ID；None 时由 LLM 后端决定
    pub model: Option<String>,
    /// 覆盖人格的工具白名单
    pub tool_filter: Option<ToolFilter>,
    pub event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
    pub cancel_token: Option<CancellationToken>,
    /// 是否把最终答案写入对话
    pub persist: bool,
}

impl RunOptions {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            model: None,
            tool_filter: None,
            event_tx: None,
            cancel_token: None,
            persist: true,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_tool_filter(mut self, filter: ToolFilter) -> Self {
        self.tool_filter = Some(filter);
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// 子 Agent 的答案由调用方汇总，不单独写入对话
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }
}

fn send_event(tx: &Option<mpsc::UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 推理循环：持有 LLM、工具执行器与对话存储，可被多个会话 / 子 Agent / 工作流步骤共享
pub struct ReasoningLoop {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    conversations: Arc<dyn ConversationStore>,
}

impl ReasoningLoop {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolExecutor>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            llm,
            tools,
            conversations,
        }
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// 执行一次完整的推理循环
    pub async fn run(
        &self,
        ctx: &RequestContext,
        history: &[Message],
        user_message: &str,
        persona: Option<&Persona>,
        opts: RunOptions,
    ) -> Result<AgentResponse, AgentError> {
        let filter = opts
            .tool_filter
            .clone()
            .or_else(|| persona.map(Persona::tool_filter))
            .unwrap_or_default();
        let system_prompt = persona
            .map(|p| p.system_prompt.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_IDENTITY);
        let tool_catalogue = self.tools.describe(&filter);
        let history_text = format_history(history);

        let mut transcript: Vec<String> = Vec::new();
        let mut steps: Vec<ReasoningStep> = Vec::new();

        for iteration in 1..=opts.max_iterations {
            if opts.cancel_token.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(AgentError::Cancelled);
            }

            let prompt = build_prompt(&PromptParts {
                system_prompt,
                tool_catalogue: &tool_catalogue,
                history: &history_text,
                question: user_message,
                transcript: &transcript,
            });
            let output = self
                .llm
                .complete(&prompt, opts.model.as_deref())
                .await
                .map_err(AgentError::LlmError)?;
            let output = strip_fabricated_observation(&output);
            let step = parse_react_output(output);
            tracing::debug!(
                "react iteration {}/{}: action={:?} final={}",
                iteration,
                opts.max_iterations,
                step.action,
                step.is_final_answer
            );

            if !step.thought.is_empty() {
                send_event(&opts.event_tx, ReactEvent::Thought {
                    iteration,
                    thought: step.thought.clone(),
                });
            }

            if step.is_final_answer {
                let answer = step.final_answer.clone().unwrap_or_default();
                let thought = step.thought.clone();
                steps.push(step);
                send_event(&opts.event_tx, ReactEvent::FinalAnswer {
                    answer: answer.clone(),
                });
                let response = AgentResponse {
                    answer,
                    thought,
                    steps,
                };
                if opts.persist {
                    self.persist_answer(ctx, &response);
                }
                return Ok(response);
            }

            let observation = match &step.action {
                None => FORMAT_REMINDER.to_string(),
                Some(tool) => {
                    let args = Value::Object(step.action_input.clone());
                    send_event(&opts.event_tx, ReactEvent::ToolCall {
                        iteration,
                        tool: tool.clone(),
                        args: args.clone(),
                    });
                    match self.tools.execute(ctx, tool, args, &filter).await {
                        Ok(value) => observation_text(&value),
                        Err(e) => {
                            tracing::warn!("tool {} failed: {}", tool, e);
                            format!("Error: {}", e)
                        }
                    }
                }
            };
            send_event(&opts.event_tx, ReactEvent::Observation {
                iteration,
                tool: step.action.clone(),
                preview: preview(&observation),
            });

            transcript.push(output.to_string());
            transcript.push(format!("Observation: {}", observation));
            steps.push(step.with_observation(observation));
        }

        Err(AgentError::IterationLimitExceeded {
            max: opts.max_iterations,
            steps,
        })
    }

    /// 最终答案写为一条 assistant 消息（无会话 ID 时跳过）；写入失败只记录日志
    fn persist_answer(&self, ctx: &RequestContext, response: &AgentResponse) {
        let Some(conversation_id) = ctx.conversation_id.as_deref() else {
            return;
        };
        let message = Message::assistant(conversation_id, response.answer.clone()).with_metadata(
            serde_json::json!({
                "thought": response.thought,
                "steps": response.steps,
                "parent_task_id": ctx.parent_task_id,
            }),
        );
        if let Err(e) = self.conversations.append(message) {
            tracing::error!("Failed to persist assistant message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{InMemoryConversationStore, Role};
    use crate::tools::{EchoTool, ToolRegistry};

    fn build(llm: ScriptedLlmClient) -> (ReasoningLoop, Arc<InMemoryConversationStore>) {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let conversations = Arc::new(InMemoryConversationStore::new());
        let react = ReasoningLoop::new(
            Arc::new(llm),
            Arc::new(ToolExecutor::new(registry, 5)),
            conversations.clone(),
        );
        (react, conversations)
    }

    #[tokio::test]
    async fn tool_then_final_answer_is_persisted() {
        let llm = ScriptedLlmClient::sequence(vec![
            "Thought: echo it\nAction: echo\nAction Input: {\"text\": \"pong\"}".into(),
            "Thought: done\nFinal Answer: pong".into(),
        ]);
        let (react, conversations) = build(llm.clone());
        let ctx = RequestContext::for_conversation("c1");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let resp = react
            .run(&ctx, &[], "ping?", None, RunOptions::new(5).with_event_tx(tx))
            .await
            .unwrap();

        assert_eq!(resp.answer, "pong");
        assert_eq!(resp.thought, "done");
        assert_eq!(resp.iterations(), 2);
        assert_eq!(resp.steps[0].observation.as_deref(), Some("pong"));
        // 第二轮 prompt 含第一轮输出与 Observation
        let second = &llm.calls()[1].prompt;
        assert!(second.contains("Action: echo"));
        assert!(second.contains("Observation: pong"));

        let saved = conversations.recent_window("c1", 10).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].role, Role::Assistant);
        assert_eq!(saved[0].metadata["thought"], "done");
        assert_eq!(saved[0].metadata["steps"].as_array().unwrap().len(), 2);

        let mut thoughts = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, ReactEvent::Thought { .. }) {
                thoughts += 1;
            }
        }
        assert_eq!(thoughts, 2);
    }

    #[tokio::test]
    async fn tool_error_becomes_observation() {
        let llm = ScriptedLlmClient::sequence(vec![
            "Thought: try\nAction: echo\nAction Input: {}".into(),
            "Thought: try missing\nAction: missing_tool\nAction Input: {}".into(),
            "Final Answer: gave up".into(),
        ]);
        let (react, _) = build(llm);
        let resp = react
            .run(&RequestContext::new(), &[], "q", None, RunOptions::new(5))
            .await
            .unwrap();
        let obs0 = resp.steps[0].observation.as_deref().unwrap();
        assert!(obs0.starts_with("Error:") && obs0.contains("missing required parameter"));
        let obs1 = resp.steps[1].observation.as_deref().unwrap();
        assert!(obs1.contains("Unknown tool"));
        assert_eq!(resp.answer, "gave up");
    }

    #[tokio::test]
    async fn persona_filter_blocks_tools() {
        let llm = ScriptedLlmClient::sequence(vec![
            "Thought: t\nAction: echo\nAction Input: {\"text\": \"x\"}".into(),
            "Final Answer: ok".into(),
        ]);
        let (react, _) = build(llm.clone());
        let persona = Persona::new("w", "Writer", "You write.").with_tools(&["current_time"]);
        let resp = react
            .run(&RequestContext::new(), &[], "q", Some(&persona), RunOptions::new(3))
            .await
            .unwrap();
        assert!(resp.steps[0].observation.as_deref().unwrap().contains("not allowed"));
        let first = &llm.calls()[0].prompt;
        assert!(first.starts_with("You write."));
        assert!(!first.contains("- echo:"));
    }

    #[tokio::test]
    async fn iteration_limit_keeps_partial_steps() {
        let llm = ScriptedLlmClient::new(|_, _| Ok("Thought: loop\nAction: echo\nAction Input: {\"text\": \"again\"}".into()));
        let (react, conversations) = build(llm.clone());
        let ctx = RequestContext::for_conversation("c2");
        let err = react
            .run(&ctx, &[], "q", None, RunOptions::new(3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("max iterations reached"));
        assert_eq!(err.partial_steps().unwrap().len(), 3);
        assert_eq!(llm.call_count(), 3);
        assert!(conversations.recent_window("c2", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_failure_aborts_and_model_is_pinned() {
        let llm = ScriptedLlmClient::new(|_, _| Err("backend down".into()));
        let (react, _) = build(llm.clone());
        let err = react
            .run(
                &RequestContext::new(),
                &[],
                "q",
                None,
                RunOptions::new(3).with_model(Some("m-1".into())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LlmError(ref m) if m == "backend down"));
        assert_eq!(llm.calls()[0].model.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn missing_format_gets_reminder_and_cancel_stops() {
        let llm = ScriptedLlmClient::sequence(vec!["just chatting".into(), "Final Answer: fine".into()]);
        let (react, _) = build(llm);
        let resp = react
            .run(&RequestContext::new(), &[], "q", None, RunOptions::new(3))
            .await
            .unwrap();
        assert!(resp.steps[0].observation.as_deref().unwrap().contains("no Action"));

        let token = CancellationToken::new();
        token.cancel();
        let (react, _) = build(ScriptedLlmClient::sequence(vec![]));
        let err = react
            .run(&RequestContext::new(), &[], "q", None, RunOptions::new(3).with_cancel_token(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
