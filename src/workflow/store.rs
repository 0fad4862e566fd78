//! 工作流存储
//!
//! 执行器每次修改前都会 reload，存储只需提供整份读写。
//! - InMemoryWorkflowStore：进程内 map，测试与默认运行使用
//! - JsonFileWorkflowStore：每个工作流一个格式化 JSON 文件，先写临时文件再 rename

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::core::StoreError;
use crate::workflow::types::Workflow;

pub trait WorkflowStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Workflow, StoreError>;
    fn save(&self, workflow: &Workflow) -> Result<(), StoreError>;
    /// 按创建时间升序
    fn list(&self) -> Result<Vec<Workflow>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Io("workflow store lock poisoned".to_string())
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn get(&self, id: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .map_err(|_| poisoned())?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.workflows
            .write()
            .map_err(|_| poisoned())?
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut all: Vec<Workflow> = self
            .workflows
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }
}

/// 目录下每个工作流一个 `<id>.json`
pub struct JsonFileWorkflowStore {
    dir: PathBuf,
}

impl JsonFileWorkflowStore {
    /// 目录不存在时创建
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(StoreError::Io(format!("invalid workflow id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn read_file(path: &Path) -> Result<Workflow, StoreError> {
        let data = std::fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl WorkflowStore for JsonFileWorkflowStore {
    fn get(&self, id: &str) -> Result<Workflow, StoreError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::read_file(&path)
    }

    fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let path = self.path_for(&workflow.id)?;
        let json = serde_json::to_string_pretty(workflow)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let mut all = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_file(&path) {
                Ok(wf) => all.push(wf),
                Err(e) => tracing::warn!("Skipping unreadable workflow file {:?}: {}", path, e),
            }
        }
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StepStatus, WorkflowBuilder, WorkflowStep};

    fn sample(id: &str) -> Workflow {
        WorkflowBuilder::new("sample")
            .id(id)
            .step(WorkflowStep::new("a", "default", "hello").interrupt_after("check"))
            .build()
            .unwrap()
    }

    #[test]
    fn in_memory_get_save_list() {
        let store = InMemoryWorkflowStore::new();
        assert_eq!(store.get("nope"), Err(StoreError::NotFound("nope".into())));
        let mut wf = sample("wf_1");
        store.save(&wf).unwrap();
        wf.steps[0].status = StepStatus::Done;
        store.save(&wf).unwrap();
        assert_eq!(store.get("wf_1").unwrap().steps[0].status, StepStatus::Done);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn json_files_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = sample("wf_disk");
        wf.state.insert("a".into(), "out".into());
        {
            let store = JsonFileWorkflowStore::new(dir.path().join("wf")).unwrap();
            store.save(&wf).unwrap();
        }
        let store = JsonFileWorkflowStore::new(dir.path().join("wf")).unwrap();
        assert!(store.dir().join("wf_disk.json").exists());
        assert!(!store.dir().join("wf_disk.json.tmp").exists());
        let loaded = store.get("wf_disk").unwrap();
        assert_eq!(loaded, wf);
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(matches!(store.get("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn json_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileWorkflowStore::new(dir.path()).unwrap();
        assert!(matches!(store.get("../etc"), Err(StoreError::Io(_))));
    }
}
