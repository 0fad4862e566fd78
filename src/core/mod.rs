//! 核心编排层：错误、请求上下文、并发调度、子 Agent 任务与编排器

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod subagent;
pub mod task_scheduler;

pub use context::RequestContext;
pub use error::{AgentError, StoreError};
pub use orchestrator::SubAgentOrchestrator;
pub use subagent::{DelegateTaskSpec, SubAgentTask, TaskStatus};
pub use task_scheduler::TaskScheduler;
