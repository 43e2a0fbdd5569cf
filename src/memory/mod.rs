//! 记忆层：会话内的对话状态，以及跨会话的任务/笔记存储

pub mod conversation;
pub mod store;

pub use conversation::{ConversationState, Message, Role, ToolCall};
pub use store::{AssistantState, Note, StateStore, Task};
