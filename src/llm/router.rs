//! 模型路由：按人格角色推断默认模型
//!
//! 人格自带 model override 时直接使用；否则根据人格名称与系统提示推断任务类型，
//! 再按配置中的角色路由选择模型，未配置的类型回落到默认模型。

use std::collections::HashMap;

use crate::config::LlmSection;
use crate::persona::Persona;

/// 任务类型（用于路由决策）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// 代码生成/编辑
    CodeGeneration,
    /// 复杂推理/分析
    ComplexReasoning,
    /// 摘要/写作
    Summarization,
    /// 简单问答/检索
    SimpleChat,
    /// 默认/未知
    Default,
}

/// 任务类型检测器
pub struct TaskClassifier;

impl TaskClassifier {
    /// 根据人格名称与系统提示推断角色
    pub fn classify(persona: &Persona) -> TaskType {
        let content = format!("{} {}", persona.name, persona.system_prompt).to_lowercase();

        if Self::contains_any(&content, &[
            "code", "coder", "developer", "engineer", "programming", "rust", "python", "debug",
            "refactor", "代码", "编程",
        ]) {
            return TaskType::CodeGeneration;
        }
        if Self::contains_any(&content, &[
            "analy", "reason", "plan", "architect", "review", "evaluate", "分析", "推理", "评估",
        ]) {
            return TaskType::ComplexReasoning;
        }
        if Self::contains_any(&content, &[
            "summar", "writer", "write", "editor", "report", "总结", "摘要", "写作",
        ]) {
            return TaskType::Summarization;
        }
        if Self::contains_any(&content, &["research", "search", "lookup", "assistant", "检索"]) {
            return TaskType::SimpleChat;
        }
        TaskType::Default
    }

    fn contains_any(content: &str, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| content.contains(k))
    }
}

/// 模型路由器：任务类型 -> 模型 ID
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    default_model: Option<String>,
    task_routes: HashMap<TaskType, String>,
}

impl ModelRouter {
    pub fn new(default_model: Option<String>) -> Self {
        Self {
            default_model,
            task_routes: HashMap::new(),
        }
    }

    /// 从 [llm] 配置段构建
    pub fn from_config(cfg: &LlmSection) -> Self {
        let mut router = Self::new(cfg.default_model.clone());
        let routes = [
            (TaskType::CodeGeneration, &cfg.code_model),
            (TaskType::ComplexReasoning, &cfg.reasoning_model),
            (TaskType::Summarization, &cfg.summary_model),
            (TaskType::SimpleChat, &cfg.fast_model),
        ];
        for (task, model) in routes {
            if let Some(m) = model {
                router.set_task_route(task, m.clone());
            }
        }
        router
    }

    /// 设置任务类型的固定路由
    pub fn set_task_route(&mut self, task: TaskType, model: impl Into<String>) {
        self.task_routes.insert(task, model.into());
    }

    /// 没有人格时（如默认身份对话）使用的模型
    pub fn default_model(&self) -> Option<String> {
        self.default_model.clone()
    }

    /// 人格 override 优先，其次角色推断，最后默认模型
    pub fn route(&self, persona: &Persona) -> Option<String> {
        if let Some(m) = persona.model_override.as_ref().filter(|m| !m.is_empty()) {
            return Some(m.clone());
        }
        let task = TaskClassifier::classify(persona);
        self.task_routes
            .get(&task)
            .cloned()
            .or_else(|| self.default_model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(name: &str, prompt: &str) -> Persona {
        Persona::new(name.to_lowercase(), name, prompt)
    }

    #[test]
    fn classify_by_role_keywords() {
        assert_eq!(
            TaskClassifier::classify(&persona("Coder", "You write Rust code.")),
            TaskType::CodeGeneration
        );
        assert_eq!(
            TaskClassifier::classify(&persona("Analyst", "You analyze data.")),
            TaskType::ComplexReasoning
        );
        assert_eq!(
            TaskClassifier::classify(&persona("Writer", "You produce clear prose.")),
            TaskType::Summarization
        );
        assert_eq!(
            TaskClassifier::classify(&persona("Zed", "Be kind.")),
            TaskType::Default
        );
    }

    #[test]
    fn override_wins_then_route_then_default() {
        let mut router = ModelRouter::new(Some("base".into()));
        router.set_task_route(TaskType::CodeGeneration, "code-large");

        let mut coder = persona("Coder", "code");
        assert_eq!(router.route(&coder).as_deref(), Some("code-large"));

        coder.model_override = Some("pinned".into());
        assert_eq!(router.route(&coder).as_deref(), Some("pinned"));

        assert_eq!(router.route(&persona("Zed", "hi")).as_deref(), Some("base"));
    }
}
