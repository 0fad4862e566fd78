//! 工作流引擎
//!
//! 每个活跃工作流一个后台控制循环：reload -> 计算就绪步骤 -> 并发执行一批 -> 再次 reload。
//! 所有 “读-改-写” 都在引擎级互斥区内完成，步骤状态与工作流状态在同一次更新里落盘；
//! 互斥区不覆盖 LLM 调用本身。
//!
//! 暂停时控制循环阻塞在该工作流的恢复信号上；resume 若找不到活着的循环则重新拉起一个。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::core::{AgentError, RequestContext};
use crate::llm::ModelRouter;
use crate::notify::{workflow_topic, Notifier};
use crate::persona::{resolve_persona, PersonaStore};
use crate::react::{ReasoningLoop, RunOptions};
use crate::tools::ToolFilter;
use crate::workflow::graph::{deadlock_reason, evaluate};
use crate::workflow::interpolate::interpolate;
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::*;

/// 步骤执行器：给定插值后的 prompt 运行一个步骤
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &RequestContext,
        step: &WorkflowStep,
        prompt: &str,
    ) -> Result<StepResult, AgentError>;
}

/// 用推理循环执行步骤：按 persona_id 解析人格，步骤自带工具白名单时覆盖人格白名单
pub struct ReactStepExecutor {
    react: Arc<ReasoningLoop>,
    personas: Arc<dyn PersonaStore>,
    router: ModelRouter,
    max_iterations: usize,
}

impl ReactStepExecutor {
    pub fn new(
        react: Arc<ReasoningLoop>,
        personas: Arc<dyn PersonaStore>,
        router: ModelRouter,
        max_iterations: usize,
    ) -> Self {
        Self {
            react,
            personas,
            router,
            max_iterations,
        }
    }
}

#[async_trait]
impl StepExecutor for ReactStepExecutor {
    async fn execute(
        &self,
        ctx: &RequestContext,
        step: &WorkflowStep,
        prompt: &str,
    ) -> Result<StepResult, AgentError> {
        let persona = resolve_persona(self.personas.as_ref(), &step.persona_id)
            .ok_or_else(|| AgentError::PersonaNotFound(step.persona_id.clone()))?;
        let model = self.router.route(&persona);
        let mut opts = RunOptions::new(self.max_iterations).with_model(model.clone());
        if !step.allowed_tools.is_empty() {
            opts = opts.with_tool_filter(ToolFilter::from_allow_list(&step.allowed_tools));
        }

        let response = self.react.run(ctx, &[], prompt, Some(&persona), opts).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("iterations".into(), response.iterations().into());
        metadata.insert("persona".into(), persona.name.clone().into());
        if let Some(m) = model {
            metadata.insert("model".into(), m.into());
        }
        Ok(StepResult {
            output: response.answer,
            metadata,
        })
    }
}

struct EngineInner {
    store: Arc<dyn WorkflowStore>,
    executor: Arc<dyn StepExecutor>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    /// 互斥区：所有 reload-修改-save 串行
    state_lock: Mutex<()>,
    /// 工作流 ID -> 恢复信号；每个活着的控制循环一项
    signals: RwLock<HashMap<WorkflowId, Arc<Notify>>>,
}

/// 工作流引擎（可克隆句柄）
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        executor: Arc<dyn StepExecutor>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                executor,
                notifier,
                poll_interval,
                state_lock: Mutex::new(()),
                signals: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// 校验并以 Pending 状态持久化，不启动
    pub async fn submit(&self, mut workflow: Workflow) -> Result<WorkflowId, WorkflowError> {
        workflow.validate()?;
        workflow.status = WorkflowStatus::Pending;
        let _guard = self.inner.state_lock.lock().await;
        self.inner.store.save(&workflow)?;
        tracing::info!(
            "Workflow {} submitted ({} steps)",
            workflow.id,
            workflow.steps.len()
        );
        Ok(workflow.id)
    }

    /// 提交并立即启动
    pub async fn start(&self, workflow: Workflow) -> Result<WorkflowId, WorkflowError> {
        let id = self.submit(workflow).await?;
        self.run(&id).await?;
        Ok(id)
    }

    /// 启动一个已提交的工作流：持久化 Running 并拉起控制循环
    pub async fn run(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        {
            let _guard = self.inner.state_lock.lock().await;
            let mut wf = self.inner.store.get(workflow_id)?;
            if wf.status != WorkflowStatus::Pending {
                return Err(WorkflowError::InvalidTransition {
                    id: wf.id,
                    from: wf.status,
                    action: "run",
                });
            }
            wf.status = WorkflowStatus::Running;
            wf.started_at = Some(chrono::Utc::now().timestamp_millis());
            self.inner.store.save(&wf)?;
            tracing::info!("Workflow {} started", wf.id);
            self.publish_status(&wf);
        }
        self.launch(workflow_id).await;
        Ok(())
    }

    /// 仅 Paused 可恢复；有等待中的循环则唤醒，否则重新拉起
    pub async fn resume(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        {
            let _guard = self.inner.state_lock.lock().await;
            let mut wf = self.inner.store.get(workflow_id)?;
            if wf.status != WorkflowStatus::Paused {
                return Err(WorkflowError::InvalidTransition {
                    id: wf.id,
                    from: wf.status,
                    action: "resume",
                });
            }
            if let Some(pause) = wf.paused_on.take() {
                if pause.point == PausePoint::Before {
                    if let Some(step) = wf.step_mut(&pause.step_id) {
                        step.approved = true;
                    }
                }
            }
            wf.status = WorkflowStatus::Running;
            self.inner.store.save(&wf)?;
            tracing::info!("Workflow {} resumed", wf.id);
            self.publish_status(&wf);
        }
        self.launch(workflow_id).await;
        Ok(())
    }

    /// Running / Paused 可取消：未终结的步骤全部标记 Cancelled，并唤醒等待中的循环。
    /// 正在执行的步骤不会被打断，其结果会被丢弃。
    pub async fn cancel(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        {
            let _guard = self.inner.state_lock.lock().await;
            let mut wf = self.inner.store.get(workflow_id)?;
            if !matches!(wf.status, WorkflowStatus::Running | WorkflowStatus::Paused) {
                return Err(WorkflowError::InvalidTransition {
                    id: wf.id,
                    from: wf.status,
                    action: "cancel",
                });
            }
            let now = chrono::Utc::now().timestamp_millis();
            for step in wf.steps.iter_mut().filter(|s| !s.status.is_terminal()) {
                step.status = StepStatus::Cancelled;
                step.finished_at = Some(now);
            }
            wf.finish(WorkflowStatus::Cancelled, None);
            self.inner.store.save(&wf)?;
            tracing::info!("Workflow {} cancelled", wf.id);
            self.publish_status(&wf);
        }
        if let Some(signal) = self.inner.signals.read().await.get(workflow_id) {
            signal.notify_one();
        }
        Ok(())
    }

    pub fn get(&self, workflow_id: &str) -> Result<Workflow, WorkflowError> {
        Ok(self.inner.store.get(workflow_id)?)
    }

    pub fn list(&self) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.inner.store.list()?)
    }

    /// 该工作流当前是否有活着的控制循环
    pub async fn is_active(&self, workflow_id: &str) -> bool {
        self.inner.signals.read().await.contains_key(workflow_id)
    }

    /// 等到工作流进入终态或暂停且没有步骤在跑，超时返回最后一次快照
    pub async fn wait_until_settled(
        &self,
        workflow_id: &str,
        timeout: Duration,
    ) -> Result<Workflow, WorkflowError> {
        let deadline = Instant::now() + timeout;
        loop {
            let wf = self.get(workflow_id)?;
            let settled = matches!(
                wf.status,
                WorkflowStatus::Paused
                    | WorkflowStatus::Completed
                    | WorkflowStatus::Failed
                    | WorkflowStatus::Cancelled
            ) && !wf.steps.iter().any(|s| s.status == StepStatus::Running);
            if settled || Instant::now() >= deadline {
                return Ok(wf);
            }
            tokio::time::sleep(self.inner.poll_interval.min(Duration::from_millis(20))).await;
        }
    }

    /// 已有循环则发恢复信号，否则登记信号并拉起新循环
    async fn launch(&self, workflow_id: &str) {
        let mut signals = self.inner.signals.write().await;
        if let Some(signal) = signals.get(workflow_id) {
            signal.notify_one();
            return;
        }
        let signal = Arc::new(Notify::new());
        signals.insert(workflow_id.to_string(), Arc::clone(&signal));
        drop(signals);

        let engine = self.clone();
        let id = workflow_id.to_string();
        tokio::spawn(async move {
            engine.control_loop(id, signal).await;
        });
    }

    async fn control_loop(self, workflow_id: String, signal: Arc<Notify>) {
        tracing::debug!("Control loop for workflow {} started", workflow_id);
        self.recover_orphaned_steps(&workflow_id).await;

        loop {
            let wf = match self.inner.store.get(&workflow_id) {
                Ok(wf) => wf,
                Err(e) => {
                    tracing::error!("Failed to reload workflow {}: {}", workflow_id, e);
                    if self.try_exit(&workflow_id).await {
                        return;
                    }
                    tokio::time::sleep(self.inner.poll_interval).await;
                    continue;
                }
            };

            match wf.status {
                WorkflowStatus::Running => {}
                WorkflowStatus::Paused => {
                    signal.notified().await;
                    if self.try_exit(&workflow_id).await {
                        return;
                    }
                    continue;
                }
                _ => {
                    if self.try_exit(&workflow_id).await {
                        return;
                    }
                    continue;
                }
            }

            let schedule = evaluate(&wf);
            if schedule.any_failed || schedule.complete {
                self.settle(&workflow_id).await;
                continue;
            }
            if schedule.runnable.is_empty() {
                if schedule.any_running {
                    tokio::time::sleep(self.inner.poll_interval).await;
                } else {
                    self.fail_deadlocked(&workflow_id).await;
                }
                continue;
            }

            tracing::debug!(
                "Workflow {}: running batch {:?}",
                workflow_id,
                schedule.runnable
            );
            let batch = schedule
                .runnable
                .iter()
                .map(|step_id| self.execute_step(&workflow_id, step_id));
            join_all(batch).await;
        }
    }

    /// 退出检查：在信号表写锁下 reload，仍为 Running 则继续，否则注销并退出。
    /// resume 先落盘 Running 再查信号表，因此不会丢失唤醒。
    async fn try_exit(&self, workflow_id: &str) -> bool {
        let mut signals = self.inner.signals.write().await;
        match self.inner.store.get(workflow_id) {
            Ok(wf) if wf.status == WorkflowStatus::Running => false,
            _ => {
                signals.remove(workflow_id);
                tracing::debug!("Control loop for workflow {} stopped", workflow_id);
                true
            }
        }
    }

    /// 新循环启动时没有别的循环在跑，遗留的 Running 步骤（如进程重启前中断）退回 Pending
    async fn recover_orphaned_steps(&self, workflow_id: &str) {
        let _guard = self.inner.state_lock.lock().await;
        let Ok(mut wf) = self.inner.store.get(workflow_id) else {
            return;
        };
        if wf.status.is_terminal() {
            return;
        }
        let mut changed = false;
        for step in wf.steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
            tracing::warn!(
                "Workflow {}: step {} was left running, rescheduling",
                workflow_id,
                step.id
            );
            step.status = StepStatus::Pending;
            step.started_at = None;
            changed = true;
        }
        if changed {
            self.save(&wf);
        }
    }

    /// 步骤全部终结或出现失败时收敛工作流状态
    async fn settle(&self, workflow_id: &str) {
        let _guard = self.inner.state_lock.lock().await;
        let Ok(mut wf) = self.inner.store.get(workflow_id) else {
            return;
        };
        if wf.reconcile() {
            tracing::info!("Workflow {} -> {}", wf.id, wf.status);
            self.save(&wf);
            self.publish_status(&wf);
        }
    }

    async fn fail_deadlocked(&self, workflow_id: &str) {
        let _guard = self.inner.state_lock.lock().await;
        let Ok(mut wf) = self.inner.store.get(workflow_id) else {
            return;
        };
        let schedule = evaluate(&wf);
        if wf.status != WorkflowStatus::Running
            || !schedule.runnable.is_empty()
            || schedule.any_running
            || schedule.complete
        {
            return;
        }
        let reason = deadlock_reason(&wf);
        tracing::warn!("Workflow {} {}", wf.id, reason);
        wf.finish(WorkflowStatus::Failed, Some(reason));
        self.save(&wf);
        self.publish_status(&wf);
    }

    async fn execute_step(&self, workflow_id: &str, step_id: &str) {
        let Some((ctx, step, prompt)) = self.begin_step(workflow_id, step_id).await else {
            return;
        };

        let started = Instant::now();
        let outcome = self.inner.executor.execute(&ctx, &step, &prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.finish_step(workflow_id, step_id, outcome, duration_ms).await;
    }

    /// 互斥区内：检查 before 中断，标记 Running 并插值 prompt
    async fn begin_step(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Option<(RequestContext, WorkflowStep, String)> {
        let _guard = self.inner.state_lock.lock().await;
        let mut wf = match self.inner.store.get(workflow_id) {
            Ok(wf) => wf,
            Err(e) => {
                tracing::error!("Failed to reload workflow {}: {}", workflow_id, e);
                return None;
            }
        };
        if wf.status != WorkflowStatus::Running {
            return None;
        }
        let step = wf.step(step_id)?;
        if step.status != StepStatus::Pending {
            return None;
        }

        if step.pauses_before() {
            wf.pause_at(step_id, PausePoint::Before);
            tracing::info!("Workflow {} paused before step {}", wf.id, step_id);
            self.save(&wf);
            self.publish_status(&wf);
            return None;
        }

        let prompt = interpolate(&step.prompt, &wf.state);
        let mut ctx = RequestContext::new().with_parent_task(format!("{}:{}", wf.id, step_id));
        ctx.project_id = wf.project_id.clone();

        let step = wf.step_mut(step_id)?;
        step.status = StepStatus::Running;
        step.started_at = Some(chrono::Utc::now().timestamp_millis());
        let snapshot = step.clone();

        self.save(&wf);
        self.publish_step(&wf.id, &snapshot);
        Some((ctx, snapshot, prompt))
    }

    /// 互斥区内：写回结果与共享状态，收敛工作流状态，检查 after 中断
    async fn finish_step(
        &self,
        workflow_id: &str,
        step_id: &str,
        outcome: Result<StepResult, AgentError>,
        duration_ms: u64,
    ) {
        let _guard = self.inner.state_lock.lock().await;
        let mut wf = match self.inner.store.get(workflow_id) {
            Ok(wf) => wf,
            Err(e) => {
                tracing::error!("Failed to reload workflow {}: {}", workflow_id, e);
                return;
            }
        };
        let Some(step) = wf.step_mut(step_id) else {
            return;
        };
        if step.status != StepStatus::Running {
            // 已被取消
            tracing::info!(
                "Workflow {}: discarding result of step {} ({})",
                workflow_id,
                step_id,
                step.status.as_str()
            );
            return;
        }

        step.finished_at = Some(chrono::Utc::now().timestamp_millis());
        let succeeded = match outcome {
            Ok(mut result) => {
                result
                    .metadata
                    .insert("duration_ms".into(), duration_ms.into());
                let output = result.output.clone();
                step.result = Some(result);
                step.status = StepStatus::Done;
                wf.state.insert(step_id.to_string(), output);
                true
            }
            Err(e) => {
                tracing::warn!("Workflow {}: step {} failed: {}", workflow_id, step_id, e);
                step.status = StepStatus::Failed;
                step.error = Some(e.to_string());
                false
            }
        };
        let snapshot = wf.step(step_id).cloned();

        let transitioned = wf.reconcile();
        if !transitioned && succeeded && wf.status == WorkflowStatus::Running {
            if let Some(true) = snapshot.as_ref().map(WorkflowStep::pauses_after) {
                wf.pause_at(step_id, PausePoint::After);
                tracing::info!("Workflow {} paused after step {}", wf.id, step_id);
            }
        }

        self.save(&wf);
        if let Some(step) = snapshot {
            self.publish_step(&wf.id, &step);
        }
        if transitioned || wf.status == WorkflowStatus::Paused {
            if transitioned {
                tracing::info!("Workflow {} -> {}", wf.id, wf.status);
            }
            self.publish_status(&wf);
        }
    }

    /// 持久化失败只记录日志，下一次 reload 重新推导状态
    fn save(&self, wf: &Workflow) {
        if let Err(e) = self.inner.store.save(wf) {
            tracing::error!("Failed to persist workflow {}: {}", wf.id, e);
        }
    }

    fn publish_status(&self, wf: &Workflow) {
        self.inner.notifier.publish(
            &workflow_topic(&wf.id),
            serde_json::json!({
                "event": "workflow.status",
                "workflow_id": wf.id,
                "status": wf.status,
                "error": wf.error,
                "paused_on": wf.paused_on,
            }),
        );
    }

    fn publish_step(&self, workflow_id: &str, step: &WorkflowStep) {
        self.inner.notifier.publish(
            &workflow_topic(workflow_id),
            serde_json::json!({
                "event": "workflow.step",
                "workflow_id": workflow_id,
                "step_id": step.id,
                "status": step.status,
                "output": step.output(),
                "error": step.error,
            }),
        );
    }
}
