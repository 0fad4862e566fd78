//! 人格（Persona）：系统提示 + 工具白名单 + 模型 override
//!
//! 核心只读取人格；存储实现由上层提供，这里给出内存实现与内置目录。

mod catalogue;

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::StoreError;
use crate::tools::ToolFilter;

pub use catalogue::{builtin_personas, find_builtin_by_name, DEFAULT_PERSONA_ID};

/// 人格定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    /// 允许的工具名；为空表示全部工具可用
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub model_override: Option<String>,
}

impl Persona {
    pub fn new(id: impl Into<String>, name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            allowed_tools: Vec::new(),
            model_override: None,
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.allowed_tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn tool_filter(&self) -> ToolFilter {
        ToolFilter::from_allow_list(&self.allowed_tools)
    }
}

/// 人格存储（只读视角）
pub trait PersonaStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Persona, StoreError>;

    fn list(&self) -> Vec<Persona>;
}

/// 内存人格存储，默认预置内置目录
pub struct InMemoryPersonaStore {
    personas: RwLock<HashMap<String, Persona>>,
}

impl InMemoryPersonaStore {
    pub fn empty() -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let store = Self::empty();
        for p in builtin_personas() {
            store.insert(p);
        }
        store
    }

    pub fn insert(&self, persona: Persona) {
        if let Ok(mut map) = self.personas.write() {
            map.insert(persona.id.clone(), persona);
        }
    }
}

impl Default for InMemoryPersonaStore {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PersonaStore for InMemoryPersonaStore {
    fn get(&self, id: &str) -> Result<Persona, StoreError> {
        self.personas
            .read()
            .map_err(|_| StoreError::Io("persona store lock poisoned".to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("persona {}", id)))
    }

    fn list(&self) -> Vec<Persona> {
        let mut list: Vec<Persona> = self
            .personas
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}

/// 解析人格引用：先按 ID 查存储，再按名称（忽略大小写）匹配内置目录
pub fn resolve_persona(store: &dyn PersonaStore, reference: &str) -> Option<Persona> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    store
        .get(reference)
        .ok()
        .or_else(|| find_builtin_by_name(reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_means_all_tools() {
        let p = Persona::new("x", "X", "prompt");
        assert_eq!(p.tool_filter(), ToolFilter::All);
        let p = p.with_tools(&["echo"]);
        assert!(p.tool_filter().allows("echo"));
        assert!(!p.tool_filter().allows("delegate"));
    }

    #[test]
    fn resolve_by_id_then_builtin_name() {
        let store = InMemoryPersonaStore::empty();
        store.insert(Persona::new("p-42", "Custom", "custom prompt"));

        assert_eq!(resolve_persona(&store, "p-42").unwrap().name, "Custom");
        // 存储里没有，但内置目录中有同名人格
        assert_eq!(resolve_persona(&store, "RESEARCHER").unwrap().id, "researcher");
        assert!(resolve_persona(&store, "nobody").is_none());
        assert!(resolve_persona(&store, "  ").is_none());
    }

    #[test]
    fn missing_id_is_not_found() {
        let store = InMemoryPersonaStore::with_builtins();
        assert!(matches!(store.get("ghost"), Err(StoreError::NotFound(_))));
        assert!(store.list().iter().any(|p| p.id == DEFAULT_PERSONA_ID));
    }
}
