//! 能力层：注册表、启用策略、动态加载与内置能力
//!
//! 能力（capability）是一组相关工具的提供者；注册表决定哪些能力启用，
//! 动态加载器在运行时把模型生成的模块落盘、安装依赖并注册进来。

pub mod code_evolution;
pub mod installer;
pub mod loader;
pub mod module;
pub mod policy;
pub mod registry;
pub mod tasks_notes;
pub mod web_search;

use crate::core::CapabilityError;

pub use code_evolution::{AddCapabilityTool, ADD_CAPABILITY_TOOL, ENABLE_CODE_EVOLUTION};
pub use installer::{split_deps, CommandInstaller, DependencyInstaller};
pub use loader::{
    AdditionReport, CapabilityAdditionRequest, DynamicCapabilityLoader, LoaderStage, ManifestModuleLoader,
    ModuleLoader,
};
pub use module::{sanitize_id, CapabilityManifest, ToolSpec};
pub use policy::{is_truthy, EnablementPolicy};
pub use registry::{
    CapabilityContext, CapabilityEntry, CapabilityOrigin, CapabilityRegistry, CapabilityWarning,
    EnablementDecision, EnumeratedTools, ProviderResult, ToolProvider,
};
pub use web_search::ENABLE_WEB_SEARCH;

/// 注册全部内置能力（tasks_notes、web_search、code_evolution），顺序即枚举顺序
pub async fn register_builtins(registry: &CapabilityRegistry) -> Result<(), CapabilityError> {
    tasks_notes::register(registry).await?;
    web_search::register(registry).await?;
    code_evolution::register(registry).await?;
    Ok(())
}
