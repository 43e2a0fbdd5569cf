//! LLM 层：客户端抽象、OpenAI 兼容实现、提供方选择与 Mock

pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use provider::{create_llm, ModelChoice, ProviderKind};
pub use traits::LlmClient;
