//! 记忆层：对话消息与只追加的对话存储

pub mod conversation;

pub use conversation::{format_history, ConversationStore, InMemoryConversationStore, Message, Role};
