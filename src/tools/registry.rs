//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时做白名单检查、加超时并统一转 AgentError。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::RequestContext;
use crate::tools::ToolFilter;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 ReAct 输出中的 Action）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema，默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；ctx 为当前请求上下文（会话、父任务等）
    async fn execute(&self, ctx: &RequestContext, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称有序存储 Arc<dyn Tool>，保证工具目录在 prompt 中顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 经过过滤器的工具列表
    pub fn filtered(&self, filter: &ToolFilter) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|(name, _)| filter.allows(name))
            .map(|(_, tool)| tool.clone())
            .collect()
    }

    /// 生成 prompt 中的工具目录段落（每个工具一行：名称、描述、参数 schema）
    pub fn describe(&self, filter: &ToolFilter) -> String {
        let lines: Vec<String> = self
            .filtered(filter)
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {} Parameters: {}",
                    tool.name(),
                    tool.description(),
                    tool.parameters_schema()
                )
            })
            .collect();
        if lines.is_empty() {
            "(no tools available)".to_string()
        } else {
            lines.join("\n")
        }
    }
}
