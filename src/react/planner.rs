//! Planner：拼接 system prompt、调用 LLM，并把输出解析为最终回复或工具调用
//!
//! 工具调用格式：`{"tool": "add_task", "args": {...}}`，或这种对象组成的数组，可包在 ```json 代码块中。
//! 只有含 "tool" 字段的 JSON 才被当作调用尝试；这类 JSON 解析失败即 MalformedOutput。

use std::sync::Arc;

use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCall};
use crate::tools::{tool_call_schema_json, ToolSet};

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具；text 为调用前的说明文字（可为空）
    ToolCalls { text: String, calls: Vec<ToolCall> },
}

/// 从输出中找出 JSON 候选：```json 代码块，或从首个 { / [ 到对应的最后一个 } / ]
fn json_candidate(trimmed: &str) -> Option<(String, &str)> {
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some((trimmed[..start].trim().to_string(), block.trim()));
    }
    let open = trimmed.find(['{', '['])?;
    let close = if trimmed[open..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    if end < open {
        return None;
    }
    Some((trimmed[..open].trim().to_string(), &trimmed[open..=end]))
}

fn has_tool_key(v: &Value) -> bool {
    v.as_object().map_or(false, |o| o.contains_key("tool"))
}

fn to_call(v: Value) -> Result<ToolCall, AgentError> {
    serde_json::from_value::<ToolCall>(v).map_err(|e| AgentError::MalformedOutput(e.to_string()))
}

/// 解析 LLM 输出
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();
    let response = || Ok(PlannerOutput::Response(trimmed.to_string()));

    let Some((text, json_str)) = json_candidate(trimmed) else {
        return response();
    };
    let is_attempt = json_str.contains("\"tool\"");

    let value: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) if is_attempt => {
            return Err(AgentError::MalformedOutput(format!("{}: {}", e, json_str)));
        }
        Err(_) => return response(),
    };

    let calls = match value {
        v @ Value::Object(_) if has_tool_key(&v) => vec![to_call(v)?],
        Value::Array(items) if !items.is_empty() && items.iter().all(has_tool_key) => items
            .into_iter()
            .map(to_call)
            .collect::<Result<Vec<_>, _>>()?,
        Value::Array(items) if items.iter().any(has_tool_key) => {
            return Err(AgentError::MalformedOutput(format!(
                "mixed tool call array: {}",
                json_str
            )));
        }
        _ => return response(),
    };

    // "tool": "" 视为普通回复
    if calls.iter().any(|c| c.tool.trim().is_empty()) {
        return response();
    }
    Ok(PlannerOutput::ToolCalls { text, calls })
}

/// 拼出完整 system prompt：基础 prompt + 可用工具 + 调用格式
pub fn compose_system_prompt(base: &str, tools: &ToolSet) -> String {
    if tools.is_empty() {
        return base.to_string();
    }
    format!(
        "{}\n\n## Available tools\n{}\n\n## Calling tools\n\
         To call a tool, reply with only a JSON object matching this schema \
         (or a JSON array of such objects to call several tools in order):\n{}\n\
         Tool results come back as \"Observation from <tool>: ...\". \
         When you are done, reply to the user in plain text without JSON.",
        base,
        tools.to_schema_json(),
        tool_call_schema_json()
    )
}

/// Planner：持有 LLM 与（已拼好的）system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// system + 历史 -> 模型原始输出；传输失败为 ProviderError
    pub async fn plan(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(self.system_prompt.clone()));
        full_messages.extend_from_slice(messages);
        self.llm
            .complete(&full_messages)
            .await
            .map_err(AgentError::ProviderError)
    }
}
