//! 对话状态：有序、只追加的消息序列
//!
//! 一个会话（session）独占一份 ConversationState；模型请求时拼上 system prompt，
//! 工具结果以 ToolResult 消息写回，保证下一步规划能看到完整过程。

use serde::{Deserialize, Serialize};

/// 消息角色。System 只出现在发给模型的请求里，不写入对话状态。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    ToolResult,
    System,
}

/// 模型发出的一次工具调用（`{"tool": "add_task", "args": {...}}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Assistant 消息携带的工具调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// ToolResult 消息对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 带工具调用的 Assistant 消息（content 为调用前的说明文字，可为空）
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool.into()),
            ..Self::plain(Role::ToolResult, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 对话状态：只追加、不重排
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从外部历史（如 HTTP 请求的 chat_history）恢复；只接受 user / assistant
    pub fn from_history<'a>(history: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let messages = history
            .into_iter()
            .filter_map(|(role, content)| match role {
                "user" => Some(Message::user(content)),
                "assistant" => Some(Message::assistant(content)),
                _ => None,
            })
            .collect();
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 一次性追加一整轮的消息（turn 成功后才提交）
    pub fn extend(&mut self, turn: impl IntoIterator<Item = Message>) {
        self.messages.extend(turn);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
