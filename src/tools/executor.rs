//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时。execute 先做白名单检查，再在超时内调用工具，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{AgentError, RequestContext};
use crate::tools::{ToolFilter, ToolRegistry};

/// 工具执行器：对每次调用施加白名单与超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；不在白名单返回 ToolNotAllowed，未注册返回 UnknownTool
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        tool_name: &str,
        args: Value,
        filter: &ToolFilter,
    ) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;
        if !filter.allows(tool_name) {
            return Err(AgentError::ToolNotAllowed(tool_name.to_string()));
        }

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(ctx, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
            "conversation_id": ctx.conversation_id,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 经过滤后的工具目录文本
    pub fn describe(&self, filter: &ToolFilter) -> String {
        self.registry.describe(filter)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

/// 工具结果转为 Observation 文本：字符串原样，其它 JSON 序列化
pub fn observation_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use async_trait::async_trait;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _ctx: &RequestContext, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        ToolExecutor::new(registry, 1)
    }

    #[tokio::test]
    async fn echo_runs_when_allowed() {
        let out = executor()
            .execute(&RequestContext::new(), "echo", serde_json::json!({"text": "hi"}), &ToolFilter::All)
            .await
            .unwrap();
        assert_eq!(observation_text(&out), "hi");
    }

    #[tokio::test]
    async fn filter_and_unknown_are_errors() {
        let exec = executor();
        let only_slow = ToolFilter::Only(vec!["slow".into()]);
        let err = exec
            .execute(&RequestContext::new(), "echo", Value::Null, &only_slow)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolNotAllowed(_)));

        let err = exec
            .execute(&RequestContext::new(), "nope", Value::Null, &ToolFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = executor()
            .execute(&RequestContext::new(), "slow", Value::Null, &ToolFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(_)));
    }

    #[test]
    fn describe_respects_filter() {
        let exec = executor();
        let text = exec.describe(&ToolFilter::Only(vec!["echo".into()]));
        assert!(text.contains("- echo:"));
        assert!(!text.contains("- slow:"));
    }
}
