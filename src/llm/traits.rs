//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容端点 / Mock / 脚本化测试客户端）实现 LlmClient。

use async_trait::async_trait;

use crate::memory::Message;

/// LLM 客户端 trait：给定完整消息序列（首条为 system）返回模型文本输出
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；Err 为传输或服务端错误的描述
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
