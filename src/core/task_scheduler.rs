//! 任务调度：子 Agent 并发许可
//!
//! 委派批次内的任务全部并发启动，但同一时刻真正运行推理循环的数量受 Semaphore 限制；
//! 超出的任务排队等待许可，不会被丢弃。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::core::AgentError;

/// 任务调度器
#[derive(Clone)]
pub struct TaskScheduler {
    /// 子 Agent 并发限制（默认 4）
    subagent_semaphore: Arc<Semaphore>,
    limit: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_subagents: usize) -> Self {
        let limit = max_concurrent_subagents.max(1);
        Self {
            subagent_semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// 获取子 Agent 执行许可
    pub async fn acquire_subagent(&self) -> Result<OwnedSemaphorePermit, AgentError> {
        self.subagent_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AgentError::Cancelled)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.subagent_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_bounded_and_returned() {
        let sched = TaskScheduler::new(2);
        let a = sched.acquire_subagent().await.unwrap();
        let _b = sched.acquire_subagent().await.unwrap();
        assert_eq!(sched.available(), 0);
        drop(a);
        assert_eq!(sched.available(), 1);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(TaskScheduler::new(0).limit(), 1);
    }
}
