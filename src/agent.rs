//! Headless 引擎门面
//!
//! 把推理循环、子 Agent 编排器与工作流引擎装配在一起，对上层（HTTP 等，不在本 crate）暴露命令级接口：
//! chat / delegate / spawn / submit / run / resume / cancel workflow。
//!
//! 推理循环 -> delegate 工具 -> 编排器 -> 推理循环 构成调用环，
//! 工具通过 DelegatorHandle 持有编排器的弱引用，装配完成后再绑定。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{
    AgentError, DelegateTaskSpec, RequestContext, StoreError, SubAgentOrchestrator, SubAgentTask,
    TaskScheduler,
};
use crate::llm::{LlmClient, ModelRouter};
use crate::memory::{ConversationStore, InMemoryConversationStore, Message};
use crate::notify::{BroadcastNotifier, Notifier};
use crate::persona::{resolve_persona, InMemoryPersonaStore, PersonaStore};
use crate::react::{AgentResponse, ReasoningLoop, RunOptions};
use crate::tools::{
    CurrentTimeTool, DelegateTool, DelegatorHandle, EchoTool, SpawnTool, ToolExecutor, ToolRegistry,
};
use crate::workflow::{
    InMemoryWorkflowStore, JsonFileWorkflowStore, ReactStepExecutor, Workflow, WorkflowEngine,
    WorkflowError, WorkflowId, WorkflowStore,
};

/// 装配所需的外部协作者
pub struct EngineParts {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub personas: Arc<dyn PersonaStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub notifier: Arc<dyn Notifier>,
    /// 额外工具；内置的 echo / current_time / delegate / spawn 会自动注册
    pub tools: ToolRegistry,
}

impl EngineParts {
    /// 内存存储 + 内置人格 + 广播通知
    pub fn in_memory(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            llm,
            personas: Arc::new(InMemoryPersonaStore::with_builtins()),
            conversations: Arc::new(InMemoryConversationStore::new()),
            workflows: Arc::new(InMemoryWorkflowStore::new()),
            notifier: Arc::new(BroadcastNotifier::default()),
            tools: ToolRegistry::new(),
        }
    }
}

pub struct Engine {
    config: AppConfig,
    router: ModelRouter,
    react: Arc<ReasoningLoop>,
    personas: Arc<dyn PersonaStore>,
    conversations: Arc<dyn ConversationStore>,
    orchestrator: Arc<SubAgentOrchestrator>,
    workflows: WorkflowEngine,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts {
            config,
            llm,
            personas,
            conversations,
            workflows,
            notifier,
            mut tools,
        } = parts;

        let handle = DelegatorHandle::default();
        tools.register(EchoTool);
        tools.register(CurrentTimeTool);
        tools.register(DelegateTool::new(handle.clone()));
        tools.register(SpawnTool::new(handle.clone()));

        let executor = Arc::new(ToolExecutor::new(tools, config.agent.tool_timeout_secs));
        let react = Arc::new(ReasoningLoop::new(llm, executor, Arc::clone(&conversations)));
        let router = ModelRouter::from_config(&config.llm);

        let orchestrator = Arc::new(SubAgentOrchestrator::new(
            Arc::clone(&react),
            Arc::clone(&personas),
            router.clone(),
            Arc::clone(&notifier),
            TaskScheduler::new(config.orchestrator.max_concurrent),
            config.orchestrator.sub_agent_max_iterations,
        ));
        handle.bind(&orchestrator);

        let step_executor = Arc::new(ReactStepExecutor::new(
            Arc::clone(&react),
            Arc::clone(&personas),
            router.clone(),
            config.workflow.step_max_iterations,
        ));
        let workflows = WorkflowEngine::new(
            workflows,
            step_executor,
            notifier,
            Duration::from_millis(config.workflow.poll_interval_ms),
        );

        tracing::info!(
            "Engine ready (tools: {:?})",
            react.tools().tool_names()
        );

        Self {
            config,
            router,
            react,
            personas,
            conversations,
            orchestrator,
            workflows,
        }
    }

    /// 按配置装配：设置了 workflow.store_dir 时使用 JSON 文件存储
    pub fn from_config(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, StoreError> {
        let mut parts = EngineParts::in_memory(config.clone(), llm);
        if let Some(dir) = &config.workflow.store_dir {
            parts.workflows = Arc::new(JsonFileWorkflowStore::new(dir)?);
            tracing::info!("Workflow store: {:?}", dir);
        }
        Ok(Self::new(parts))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<SubAgentOrchestrator> {
        &self.orchestrator
    }

    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    /// 顶层对话：读取最近窗口，写入用户消息，再跑推理循环（最终答案由循环写入）。
    /// 指定的人格找不到时退回默认身份。
    pub async fn chat(
        &self,
        ctx: &RequestContext,
        message: &str,
        persona_id: Option<&str>,
    ) -> Result<AgentResponse, AgentError> {
        let persona = persona_id.and_then(|id| {
            let found = resolve_persona(self.personas.as_ref(), id);
            if found.is_none() {
                tracing::warn!("Persona '{}' not found, using default identity", id);
            }
            found
        });
        let model = match &persona {
            Some(p) => self.router.route(p),
            None => self.router.default_model(),
        };

        let history = match ctx.conversation_id.as_deref() {
            Some(conversation_id) => {
                let window = self
                    .conversations
                    .recent_window(conversation_id, self.config.agent.history_window)?;
                self.conversations
                    .append(Message::user(conversation_id, message))?;
                window
            }
            None => Vec::new(),
        };

        let opts = RunOptions::new(self.config.agent.max_iterations).with_model(model);
        self.react
            .run(ctx, &history, message, persona.as_ref(), opts)
            .await
    }

    pub async fn delegate(
        &self,
        ctx: &RequestContext,
        tasks: Vec<DelegateTaskSpec>,
    ) -> Result<Vec<SubAgentTask>, AgentError> {
        self.orchestrator.delegate(ctx, tasks).await
    }

    pub fn spawn(&self, ctx: &RequestContext, spec: DelegateTaskSpec) -> String {
        self.orchestrator.spawn(ctx, spec)
    }

    pub fn running_tasks(&self) -> Vec<SubAgentTask> {
        self.orchestrator.running_tasks()
    }

    pub async fn submit_workflow(&self, workflow: Workflow) -> Result<WorkflowId, WorkflowError> {
        self.workflows.submit(workflow).await
    }

    pub async fn run_workflow(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        self.workflows.run(workflow_id).await
    }

    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        self.workflows.resume(workflow_id).await
    }

    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        self.workflows.cancel(workflow_id).await
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, WorkflowError> {
        self.workflows.get(workflow_id)
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, WorkflowError> {
        self.workflows.list()
    }
}
