//! 对话过程事件：供 CLI / HTTP 前端展示工具调用、观察、重建与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第几步（每次调用模型前）
    StepUpdate { step: usize, max_steps: usize },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具失败（未知工具、超时、执行错误）
    ToolFailure { tool: String, reason: String },
    /// 新能力已加载，工具绑定已重建
    Rebuild { tools: Vec<String> },
    /// 最终回复
    MessageDone { text: String },
    Error { text: String },
}
