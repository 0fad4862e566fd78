//! Echo 与 current_time 工具（调试与演示用）

use async_trait::async_trait;
use serde_json::Value;

use crate::core::RequestContext;
use crate::tools::Tool;

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, _ctx: &RequestContext, args: Value) -> Result<Value, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "echo: missing required parameter 'text'".to_string())?;
        Ok(Value::String(text.to_string()))
    }
}

/// 当前 UTC 时间（RFC 3339）
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Return the current UTC time in RFC 3339 format."
    }

    async fn execute(&self, _ctx: &RequestContext, _args: Value) -> Result<Value, String> {
        Ok(Value::String(chrono::Utc::now().to_rfc3339()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_requires_text() {
        let ctx = RequestContext::new();
        let err = EchoTool.execute(&ctx, serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("missing required parameter"));
    }

    #[tokio::test]
    async fn current_time_parses() {
        let out = CurrentTimeTool
            .execute(&RequestContext::new(), Value::Null)
            .await
            .unwrap();
        let s = out.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(s).is_ok());
    }
}
