//! Swarm - Agent 执行引擎
//!
//! 入口：初始化日志、加载配置、用 Mock LLM 装配引擎，依次演示对话、并行委派与两步工作流。
//! 用法：`swarm [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use swarm::config::load_config_or_default;
use swarm::core::{DelegateTaskSpec, RequestContext};
use swarm::llm::MockLlmClient;
use swarm::workflow::{WorkflowBuilder, WorkflowStep};
use swarm::{observability, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config_or_default(config_path);

    let engine = Engine::from_config(&cfg, Arc::new(MockLlmClient))
        .context("Failed to create engine")?;

    let ctx = RequestContext::for_conversation("demo");
    let reply = engine
        .chat(&ctx, "What can you do?", None)
        .await
        .context("Chat failed")?;
    println!("chat: {}", reply.answer);

    let tasks = engine
        .delegate(
            &ctx,
            vec![
                DelegateTaskSpec::new("researcher", "List three facts about Rust"),
                DelegateTaskSpec::new("writer", "Write a one-line tagline"),
            ],
        )
        .await
        .context("Delegation failed")?;
    for task in &tasks {
        println!(
            "sub-task {} [{}]: {}",
            task.persona_name.as_deref().unwrap_or("?"),
            task.status.as_str(),
            task.result.as_deref().or(task.error.as_deref()).unwrap_or("")
        );
    }

    let workflow = WorkflowBuilder::new("demo")
        .step(WorkflowStep::new("research", "researcher", "Research the borrow checker"))
        .step(
            WorkflowStep::new("summary", "writer", "Summarize: {{state.research}}")
                .depends_on(&["research"]),
        )
        .build()
        .context("Invalid workflow")?;
    let id = engine.submit_workflow(workflow).await?;
    engine.run_workflow(&id).await?;
    let done = engine
        .workflows()
        .wait_until_settled(&id, Duration::from_secs(30))
        .await?;
    println!("workflow {} -> {}", done.id, done.status);
    for (key, value) in &done.state {
        println!("  state.{} = {}", key, value);
    }

    Ok(())
}
