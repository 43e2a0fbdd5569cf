//! 无头对话入口
//!
//! 供 HTTP 等前端调用：请求 `{message, chat_history}`，每次请求以 chat_history 开一个新会话，
//! 跑一轮后返回 `{response}`；校验失败与对话失败分别对应 400 / 500。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AgentError, AgentRuntime};
use crate::memory::ConversationState;

/// chat_history 中的一条
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatHistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// 对话请求体
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub chat_history: Vec<ChatHistoryEntry>,
}

/// 成功响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// 失败响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatErrorBody {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ChatError {
    /// 请求本身不合法（400）
    #[error("{0}")]
    BadRequest(String),

    /// 对话失败（500）
    #[error(transparent)]
    Turn(#[from] AgentError),
}

impl ChatError {
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::BadRequest(_) => 400,
            ChatError::Turn(_) => 500,
        }
    }

    pub fn body(&self) -> ChatErrorBody {
        ChatErrorBody {
            error: self.to_string(),
        }
    }
}

/// 解析请求体；空 body 视为 `{}`
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ChatError> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Ok(ChatRequest::default());
    }
    serde_json::from_str(&text).map_err(|_| ChatError::BadRequest("Invalid JSON".to_string()))
}

impl AgentRuntime {
    /// 处理一次对话请求
    pub async fn handle_chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::BadRequest("message is required".to_string()));
        }

        let history = ConversationState::from_history(
            request
                .chat_history
                .iter()
                .map(|h| (h.role.as_str(), h.content.as_str())),
        );
        let mut session = self.new_session().await.with_history(history);
        let outcome = session.run_turn(message).await?;
        Ok(ChatResponse {
            response: outcome.response,
        })
    }
}
