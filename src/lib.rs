//! Sprout - 可在运行时自我扩展能力的 Rust 个人助理
//!
//! 模块划分：
//! - **agent**: 无头对话入口（供 HTTP 等调用）
//! - **capabilities**: 能力注册表、启用策略、动态能力加载器与内置能力
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、对话编排器、运行时装配
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容端点 / Mock）
//! - **memory**: 对话状态与任务/笔记持久化
//! - **observability**: 日志初始化
//! - **react**: Planner、ReAct 主循环、过程事件
//! - **tools**: Tool trait、工具集、执行器、脚本工具

pub mod agent;
pub mod capabilities;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{AgentRuntime, ConversationOrchestrator};
