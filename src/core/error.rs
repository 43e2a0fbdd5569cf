//! 错误类型
//!
//! - AgentError：单轮对话（turn）级失败，返回给调用方，对话状态保持不变以便重试
//! - CapabilityError：动态能力加载各阶段的结构化失败，由 add_capability 工具转成文字交给模型
//! - StoreError：任务/笔记存储的读写失败

use thiserror::Error;

/// 对话编排过程中可能出现的错误（模型不可用、输出格式错误、工具失败等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 不支持或不可达的模型提供方
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// 模型输出了无法解析的 tool call
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 动态能力加载失败（对应加载状态机的各个失败出口）
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// 能力 id 清洗后为空
    #[error("Invalid capability_name: must be alphanumeric/underscore only.")]
    Validation(String),

    /// id 已存在于注册表或磁盘
    #[error("Capability {0} already exists. Try a different name or use the existing one.")]
    Conflict(String),

    #[error("Failed to write file: {source}")]
    Write {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// 工具名已由另一个能力提供
    #[error("Tool {tool} is already provided by capability {owner}. Choose a different tool name.")]
    ToolNameTaken { id: String, tool: String, owner: String },

    /// 依赖安装失败或超时；模块文件保留
    #[error("File written but dependency install failed: {reason}")]
    DependencyInstall { id: String, reason: String },

    /// 模块加载/注册失败；模块文件已删除
    #[error("Capability file invalid (syntax/runtime error): {reason}")]
    Load { id: String, reason: String },
}

impl CapabilityError {
    /// 失败所涉及的能力 id（清洗后）
    pub fn capability_id(&self) -> &str {
        match self {
            CapabilityError::Validation(id) | CapabilityError::Conflict(id) => id,
            CapabilityError::Write { id, .. }
            | CapabilityError::ToolNameTaken { id, .. }
            | CapabilityError::DependencyInstall { id, .. }
            | CapabilityError::Load { id, .. } => id,
        }
    }
}

/// 任务/笔记存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Task {0} not found.")]
    NotFound(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store format error: {0}")]
    Json(#[from] serde_json::Error),
}
