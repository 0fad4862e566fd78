//! Swarm - Agent 执行引擎
//!
//! 模块划分：
//! - **agent**: 引擎门面，装配各组件并暴露 chat / delegate / workflow 命令
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、请求上下文、并发调度、子 Agent 编排器
//! - **llm**: LLM 客户端抽象、Mock 实现与模型路由
//! - **memory**: 对话存储
//! - **notify**: 发布订阅通知
//! - **observability**: tracing 初始化
//! - **persona**: 人格定义、存储与内置目录
//! - **react**: ReAct 推理循环（prompt、解析、工具调度）
//! - **tools**: 工具注册、执行器与内置工具（echo、current_time、delegate、spawn）
//! - **workflow**: 工作流 DAG 执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod observability;
pub mod persona;
pub mod react;
pub mod tools;
pub mod workflow;

pub use agent::{Engine, EngineParts};
