//! LLM 客户端抽象
//!
//! 引擎只依赖一个窄接口：prompt -> completion，可选指定模型 ID。具体后端（OpenAI 兼容等）由上层提供。

use async_trait::async_trait;

/// LLM 客户端 trait（文本生成器）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；model 为 None 时由后端使用其默认模型
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, String>;
}
