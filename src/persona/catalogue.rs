//! 内置人格目录

use super::Persona;

pub const DEFAULT_PERSONA_ID: &str = "default";

pub fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            DEFAULT_PERSONA_ID,
            "Assistant",
            "You are a helpful assistant. Answer precisely and use tools when they help.",
        ),
        Persona::new(
            "researcher",
            "Researcher",
            "You are a meticulous researcher. Gather facts, cite what you found and keep answers grounded.",
        ),
        Persona::new(
            "coder",
            "Coder",
            "You are a senior software engineer. Write correct, idiomatic code and explain trade-offs briefly.",
        ),
        Persona::new(
            "analyst",
            "Analyst",
            "You analyze information, compare options and reason step by step before concluding.",
        ),
        Persona::new(
            "writer",
            "Writer",
            "You are a writer and editor. Summarize and rewrite content clearly for the intended audience.",
        )
        .with_tools(&["echo", "current_time"]),
    ]
}

/// 按名称或 ID 忽略大小写匹配
pub fn find_builtin_by_name(name: &str) -> Option<Persona> {
    builtin_personas()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name) || p.id.eq_ignore_ascii_case(name))
}
