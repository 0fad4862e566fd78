//! 引擎集成测试：真实推理循环 + 脚本化 LLM

use std::sync::Arc;
use std::time::Duration;

use swarm::config::AppConfig;
use swarm::core::{RequestContext, TaskStatus};
use swarm::llm::{question_of, ScriptedLlmClient};
use swarm::notify::RecordingNotifier;
use swarm::workflow::{StepStatus, WorkflowBuilder, WorkflowStatus, WorkflowStep};
use swarm::{Engine, EngineParts};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.workflow.poll_interval_ms = 10;
    cfg
}

/// 问题为 "research" 时回答 ok，否则回显问题
fn step_llm() -> ScriptedLlmClient {
    ScriptedLlmClient::new(|prompt, _| {
        let q = question_of(prompt);
        if q == "research" {
            Ok("Thought: easy\nFinal Answer: ok".to_string())
        } else {
            Ok(format!("Thought: writing\nFinal Answer: summary of [{}]", q))
        }
    })
}

#[tokio::test]
async fn two_step_workflow_passes_state_forward() {
    let llm = step_llm();
    let engine = Engine::new(EngineParts::in_memory(fast_config(), Arc::new(llm.clone())));

    let wf = WorkflowBuilder::new("e2e")
        .step(WorkflowStep::new("A", "researcher", "research"))
        .step(WorkflowStep::new("B", "writer", "Summarize: {{state.A}}").depends_on(&["A"]))
        .build()
        .unwrap();
    let id = engine.submit_workflow(wf).await.unwrap();
    engine.run_workflow(&id).await.unwrap();
    let done = engine.workflows().wait_until_settled(&id, WAIT).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.state.len(), 2);
    assert_eq!(done.state["A"], "ok");
    assert_eq!(done.state["B"], "summary of [Summarize: ok]");
    assert!(llm
        .calls()
        .iter()
        .any(|c| question_of(&c.prompt) == "Summarize: ok"));

    let b = done.step("B").unwrap();
    let meta = &b.result.as_ref().unwrap().metadata;
    assert_eq!(meta["iterations"], 1);
    assert_eq!(meta["persona"], "Writer");
}

#[tokio::test]
async fn unknown_step_persona_fails_the_workflow() {
    let engine = Engine::new(EngineParts::in_memory(fast_config(), Arc::new(step_llm())));
    let wf = WorkflowBuilder::new("ghost")
        .step(WorkflowStep::new("A", "nobody-by-that-name", "research"))
        .build()
        .unwrap();
    let id = engine.submit_workflow(wf).await.unwrap();
    engine.run_workflow(&id).await.unwrap();
    let done = engine.workflows().wait_until_settled(&id, WAIT).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Failed);
    assert_eq!(done.step("A").unwrap().status, StepStatus::Failed);
    assert!(done.error.unwrap().contains("Persona not found"));
}

#[tokio::test]
async fn chat_delegates_through_tool_and_keeps_order() {
    let llm = ScriptedLlmClient::new(|prompt, _| {
        let q = question_of(prompt);
        match q {
            "plan the launch" if prompt.contains("Observation:") => {
                Ok("Thought: both done\nFinal Answer: combined".to_string())
            }
            "plan the launch" => Ok(concat!(
                "Thought: split it\n",
                "Action: delegate\n",
                "Action Input: {\"tasks\": [",
                "{\"persona\": \"researcher\", \"prompt\": \"sub one\"}, ",
                "{\"persona\": \"CODER\", \"prompt\": \"sub two\"}]}"
            )
            .to_string()),
            "sub one" => Ok("Thought: r\nFinal Answer: R1".to_string()),
            "sub two" => Ok("Thought: c\nFinal Answer: R2".to_string()),
            other => Err(format!("unexpected question {}", other)),
        }
    });
    let notifier = Arc::new(RecordingNotifier::new());
    let mut parts = EngineParts::in_memory(fast_config(), Arc::new(llm));
    parts.notifier = notifier.clone();
    let engine = Engine::new(parts);

    let ctx = RequestContext::for_conversation("conv-7");
    let resp = engine.chat(&ctx, "plan the launch", None).await.unwrap();

    assert_eq!(resp.answer, "combined");
    let observation = resp.steps[0].observation.as_deref().unwrap();
    let r1 = observation.find("R1").unwrap();
    let r2 = observation.find("R2").unwrap();
    assert!(r1 < r2);

    let finished = notifier.events_named("subagent.finished");
    assert_eq!(finished.len(), 2);
    assert!(finished
        .iter()
        .all(|n| n.topic == "conversation:conv-7:subagents" && n.payload["status"] == "done"));
    assert!(engine.running_tasks().is_empty());
}

#[tokio::test]
async fn direct_delegate_reports_per_task_outcomes() {
    let engine = Engine::new(EngineParts::in_memory(fast_config(), Arc::new(step_llm())));
    let tasks = engine
        .delegate(
            &RequestContext::new(),
            vec![
                swarm::core::DelegateTaskSpec::new("analyst", "research"),
                swarm::core::DelegateTaskSpec::new("missing", "research"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Done);
    assert_eq!(tasks[0].result.as_deref(), Some("ok"));
    assert_eq!(tasks[1].status, TaskStatus::Failed);
    assert!(engine.delegate(&RequestContext::new(), vec![]).await.is_err());
}

#[tokio::test]
async fn paused_workflow_resumes_from_disk_in_a_new_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = fast_config();
    cfg.workflow.store_dir = Some(dir.path().to_path_buf());

    let id = {
        let engine = Engine::from_config(&cfg, Arc::new(step_llm())).unwrap();
        let wf = WorkflowBuilder::new("durable")
            .step(WorkflowStep::new("A", "researcher", "research").interrupt_after("check A"))
            .step(WorkflowStep::new("B", "writer", "Use {{state.A}}").depends_on(&["A"]))
            .build()
            .unwrap();
        let id = engine.submit_workflow(wf).await.unwrap();
        engine.run_workflow(&id).await.unwrap();
        let paused = engine.workflows().wait_until_settled(&id, WAIT).await.unwrap();
        assert_eq!(paused.status, WorkflowStatus::Paused);
        id
    };

    let engine = Engine::from_config(&cfg, Arc::new(step_llm())).unwrap();
    assert_eq!(engine.get_workflow(&id).unwrap().status, WorkflowStatus::Paused);
    engine.resume_workflow(&id).await.unwrap();
    let done = engine.workflows().wait_until_settled(&id, WAIT).await.unwrap();

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.state["B"], "summary of [Use ok]");
    assert!(engine.cancel_workflow(&id).await.is_err());
    assert_eq!(engine.list_workflows().unwrap().len(), 1);
}
