//! LLM 层：文本生成接口、Mock 实现与按角色的模型路由

pub mod mock;
pub mod router;
pub mod traits;

pub use mock::{question_of, MockLlmClient, RecordedCall, ScriptedLlmClient};
pub use router::{ModelRouter, TaskClassifier, TaskType};
pub use traits::LlmClient;
