//! 对话存储：只追加的消息日志 + 最近窗口读取
//!
//! 窗口内容如何拼进 prompt 由推理循环负责，存储只返回消息。

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::StoreError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// 单条消息；metadata 保存思考与推理步骤等附加信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl Message {
    fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            metadata: serde_json::Value::Null,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content)
    }

    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    pub fn system(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::System, content)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 对话存储
pub trait ConversationStore: Send + Sync {
    fn append(&self, message: Message) -> Result<(), StoreError>;

    /// 最近 n 条消息（时间顺序）
    fn recent_window(&self, conversation_id: &str, n: usize) -> Result<Vec<Message>, StoreError>;
}

/// 内存对话存储
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .map(|c| c.get(conversation_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn append(&self, message: Message) -> Result<(), StoreError> {
        let mut map = self
            .conversations
            .write()
            .map_err(|_| StoreError::Io("conversation store lock poisoned".to_string()))?;
        map.entry(message.conversation_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    fn recent_window(&self, conversation_id: &str, n: usize) -> Result<Vec<Message>, StoreError> {
        let map = self
            .conversations
            .read()
            .map_err(|_| StoreError::Io("conversation store lock poisoned".to_string()))?;
        let messages = map.get(conversation_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = messages.len().saturating_sub(n);
        Ok(messages[start..].to_vec())
    }
}

/// 把消息窗口格式化为 prompt 段落
pub fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
