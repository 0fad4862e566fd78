//! delegate / spawn 工具：在推理循环内部把任务委派给子 Agent
//!
//! 推理循环不直接依赖编排器；编排器在构建完成后通过 DelegatorHandle 绑定到这两个工具（弱引用，避免循环持有）。

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, DelegateTaskSpec, RequestContext, SubAgentTask};
use crate::tools::Tool;

/// 委派能力：由子 Agent 编排器实现
#[async_trait]
pub trait Delegator: Send + Sync {
    /// 并行执行，结果按输入顺序返回
    async fn delegate(
        &self,
        ctx: &RequestContext,
        tasks: Vec<DelegateTaskSpec>,
    ) -> Result<Vec<SubAgentTask>, AgentError>;

    /// 脱离调用方生命周期的后台委派，立即返回任务 ID，结果经通知发布
    fn spawn(self: Arc<Self>, ctx: &RequestContext, spec: DelegateTaskSpec) -> String;
}

/// 延迟绑定的委派句柄
#[derive(Clone, Default)]
pub struct DelegatorHandle {
    slot: Arc<OnceLock<Weak<dyn Delegator>>>,
}

impl DelegatorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定编排器；只生效一次
    pub fn bind<D: Delegator + 'static>(&self, delegator: &Arc<D>) {
        let weak: Weak<dyn Delegator> = Arc::downgrade(delegator) as Weak<D>;
        if self.slot.set(weak).is_err() {
            tracing::warn!("delegator already bound, ignoring rebind");
        }
    }

    pub fn get(&self) -> Result<Arc<dyn Delegator>, String> {
        self.slot
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| "delegation is not available in this context".to_string())
    }
}

fn parse_spec(value: &Value) -> Result<DelegateTaskSpec, String> {
    let persona = value
        .get("persona")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing required parameter 'persona'".to_string())?;
    let prompt = value
        .get("prompt")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing required parameter 'prompt'".to_string())?;
    Ok(DelegateTaskSpec::new(persona, prompt))
}

/// delegate 工具：{"tasks": [{"persona", "prompt"}, ...]} 或单个 {"persona", "prompt"}
pub struct DelegateTool {
    handle: DelegatorHandle,
}

impl DelegateTool {
    pub fn new(handle: DelegatorHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate one or more sub-tasks to specialist agents that run in parallel. Returns each task's status and result in input order."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "persona": { "type": "string", "description": "Persona name or id" },
                            "prompt": { "type": "string" }
                        },
                        "required": ["persona", "prompt"]
                    }
                }
            },
            "required": ["tasks"]
        })
    }

    async fn execute(&self, ctx: &RequestContext, args: Value) -> Result<Value, String> {
        let specs: Vec<DelegateTaskSpec> = match args.get("tasks").and_then(|v| v.as_array()) {
            Some(items) => items
                .iter()
                .map(parse_spec)
                .collect::<Result<_, _>>()
                .map_err(|e| format!("delegate: {}", e))?,
            None => vec![parse_spec(&args).map_err(|e| format!("delegate: {}", e))?],
        };
        let delegator = self.handle.get()?;
        let tasks = delegator
            .delegate(ctx, specs)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Value::Array(tasks.iter().map(SubAgentTask::summary).collect()))
    }
}

/// spawn 工具：后台运行一个子任务，结果稍后通过通知送达
pub struct SpawnTool {
    handle: DelegatorHandle,
}

impl SpawnTool {
    pub fn new(handle: DelegatorHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Start a long-running sub-task in the background. Returns a task id immediately; the result is delivered later as a notification."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "persona": { "type": "string", "description": "Persona name or id" },
                "prompt": { "type": "string" }
            },
            "required": ["persona", "prompt"]
        })
    }

    async fn execute(&self, ctx: &RequestContext, args: Value) -> Result<Value, String> {
        let spec = parse_spec(&args).map_err(|e| format!("spawn: {}", e))?;
        let delegator = self.handle.get()?;
        let task_id = delegator.spawn(ctx, spec);
        Ok(serde_json::json!({ "task_id": task_id, "status": "spawned" }))
    }
}
