//! 子 Agent 编排器
//!
//! delegate：把一组任务并行分发给按人格裁剪的推理循环，结果按输入顺序返回；单个任务失败只体现在该任务上。
//! spawn：脱离调用方生命周期的后台委派，结果通过通知发布。
//! 运行中的任务登记在活跃表中（读写锁），任务结束无论成败都会移除。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc;

use crate::core::{AgentError, DelegateTaskSpec, RequestContext, SubAgentTask, TaskScheduler};
use crate::llm::ModelRouter;
use crate::notify::{subagent_topic, Notifier};
use crate::persona::{resolve_persona, PersonaStore};
use crate::react::{ReactEvent, ReasoningLoop, RunOptions};
use crate::tools::Delegator;

type Registry = RwLock<HashMap<String, SubAgentTask>>;

/// 活跃表登记守卫：离开作用域时移除任务
struct Registration<'a> {
    registry: &'a Registry,
    task_id: String,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a Registry, task: &SubAgentTask) -> Self {
        if let Ok(mut map) = registry.write() {
            map.insert(task.id.clone(), task.clone());
        }
        Self {
            registry,
            task_id: task.id.clone(),
        }
    }

    fn update(&self, task: &SubAgentTask) {
        if let Ok(mut map) = self.registry.write() {
            if let Some(entry) = map.get_mut(&self.task_id) {
                *entry = task.clone();
            }
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.write() {
            map.remove(&self.task_id);
        }
    }
}

/// 子 Agent 编排器
pub struct SubAgentOrchestrator {
    react: Arc<ReasoningLoop>,
    personas: Arc<dyn PersonaStore>,
    router: ModelRouter,
    notifier: Arc<dyn Notifier>,
    scheduler: TaskScheduler,
    /// 子 Agent 推理步数上限
    max_iterations: usize,
    running: Registry,
}

impl SubAgentOrchestrator {
    pub fn new(
        react: Arc<ReasoningLoop>,
        personas: Arc<dyn PersonaStore>,
        router: ModelRouter,
        notifier: Arc<dyn Notifier>,
        scheduler: TaskScheduler,
        max_iterations: usize,
    ) -> Self {
        Self {
            react,
            personas,
            router,
            notifier,
            scheduler,
            max_iterations,
            running: RwLock::new(HashMap::new()),
        }
    }

    /// 并行执行所有任务；仅当输入为空时返回错误
    pub async fn delegate(
        &self,
        ctx: &RequestContext,
        tasks: Vec<DelegateTaskSpec>,
    ) -> Result<Vec<SubAgentTask>, AgentError> {
        if tasks.is_empty() {
            return Err(AgentError::EmptyDelegation);
        }
        tracing::info!("Delegating {} sub-tasks", tasks.len());
        let runs = tasks
            .into_iter()
            .map(|spec| self.run_task(ctx, new_task_id(), spec, false));
        // join_all 按输入顺序返回，与完成顺序无关
        Ok(join_all(runs).await)
    }

    /// 后台运行单个任务并立即返回任务 ID
    pub fn spawn(self: &Arc<Self>, ctx: &RequestContext, spec: DelegateTaskSpec) -> String {
        let task_id = new_task_id();
        let this = Arc::clone(self);
        let ctx = ctx.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let task = this.run_task(&ctx, id, spec, true).await;
            tracing::info!("Spawned sub-task {} finished: {}", task.id, task.status.as_str());
        });
        task_id
    }

    /// 当前运行中的任务快照
    pub fn running_tasks(&self) -> Vec<SubAgentTask> {
        let mut tasks: Vec<SubAgentTask> = self
            .running
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    pub fn get_running(&self, task_id: &str) -> Option<SubAgentTask> {
        self.running.read().ok()?.get(task_id).cloned()
    }

    async fn run_task(
        &self,
        ctx: &RequestContext,
        task_id: String,
        spec: DelegateTaskSpec,
        detached: bool,
    ) -> SubAgentTask {
        let topic = subagent_topic(ctx.conversation_id.as_deref());
        let mut task = SubAgentTask::new(task_id, spec.prompt);
        task.parent_task_id = ctx.parent_task_id.clone();
        task.conversation_id = ctx.conversation_id.clone();

        let Some(persona) = resolve_persona(self.personas.as_ref(), &spec.persona) else {
            tracing::warn!("Sub-task {}: persona '{}' not found", task.id, spec.persona);
            task.mark_failed(format!("persona not found: {}", spec.persona));
            self.publish_finished(&topic, &task, detached);
            return task;
        };
        task.persona_id = Some(persona.id.clone());
        task.persona_name = Some(persona.name.clone());
        task.model = self.router.route(&persona);

        let registration = Registration::new(&self.running, &task);

        let _permit = match self.scheduler.acquire_subagent().await {
            Ok(p) => p,
            Err(e) => {
                task.mark_failed(e.to_string());
                self.publish_finished(&topic, &task, detached);
                return task;
            }
        };

        task.mark_running();
        registration.update(&task);
        tracing::info!(
            "Sub-task {} running (persona={}, model={:?})",
            task.id,
            persona.name,
            task.model
        );
        self.notifier.publish(
            &topic,
            serde_json::json!({
                "event": "subagent.running",
                "detached": detached,
                "task": task.summary(),
            }),
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let opts = RunOptions::new(self.max_iterations)
            .with_model(task.model.clone())
            .with_event_tx(event_tx)
            .without_persistence();
        let child_ctx = ctx.child(&task.id);
        let run = self
            .react
            .run(&child_ctx, &[], &task.input, Some(&persona), opts);
        let forward = async {
            while let Some(event) = event_rx.recv().await {
                if let ReactEvent::Thought { iteration, thought } = event {
                    self.notifier.publish(
                        &topic,
                        serde_json::json!({
                            "event": "subagent.thought",
                            "task_id": task.id,
                            "iteration": iteration,
                            "thought": thought,
                        }),
                    );
                }
            }
        };
        let (result, ()) = tokio::join!(run, forward);

        match result {
            Ok(resp) => {
                task.steps = resp.steps;
                task.mark_done(resp.answer);
            }
            Err(e) => {
                task.steps = e.partial_steps().map(<[_]>::to_vec).unwrap_or_default();
                task.mark_failed(e.to_string());
            }
        }
        tracing::info!("Sub-task {} finished: {}", task.id, task.status.as_str());
        self.publish_finished(&topic, &task, detached);
        drop(registration);
        task
    }

    fn publish_finished(&self, topic: &str, task: &SubAgentTask, detached: bool) {
        let mut payload = task.summary();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("event".into(), "subagent.finished".into());
            obj.insert("detached".into(), detached.into());
        }
        self.notifier.publish(topic, payload);
    }
}

fn new_task_id() -> String {
    format!("task_{}", uuid::Uuid::new_v4())
}

#[async_trait]
impl Delegator for SubAgentOrchestrator {
    async fn delegate(
        &self,
        ctx: &RequestContext,
        tasks: Vec<DelegateTaskSpec>,
    ) -> Result<Vec<SubAgentTask>, AgentError> {
        SubAgentOrchestrator::delegate(self, ctx, tasks).await
    }

    fn spawn(self: Arc<Self>, ctx: &RequestContext, spec: DelegateTaskSpec) -> String {
        SubAgentOrchestrator::spawn(&self, ctx, spec)
    }
}
