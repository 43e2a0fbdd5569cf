//! 核心编排层：错误类型、会话编排器与运行时装配

pub mod builder;
pub mod error;
pub mod orchestrator;

pub use builder::{AgentBuilder, AgentRuntime};
pub use error::{AgentError, CapabilityError, StoreError};
pub use orchestrator::{AgentBinding, ConversationOrchestrator, TurnOutcome};
