pub mod builder;
pub mod engine;
pub mod graph;
pub mod interpolate;
pub mod store;
pub mod types;

pub use builder::WorkflowBuilder;
pub use engine::{ReactStepExecutor, StepExecutor, WorkflowEngine};
pub use graph::{deadlock_reason, evaluate, Schedule, WorkflowGraph};
pub use interpolate::interpolate;
pub use store::{InMemoryWorkflowStore, JsonFileWorkflowStore, WorkflowStore};
pub use types::*;
