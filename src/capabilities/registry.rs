//! 能力注册表
//!
//! 进程级目录：capability id -> (工具提供者, 启用策略)。只能追加，id 在进程生命周期内唯一，
//! 重复注册返回 Conflict 且保留原条目。enumerate_tools 按注册顺序调用各提供者拼出工具集，
//! 单个提供者失败只记录告警，不影响其余能力。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::capabilities::loader::DynamicCapabilityLoader;
use crate::capabilities::EnablementPolicy;
use crate::config::AppConfig;
use crate::core::CapabilityError;
use crate::memory::StateStore;
use crate::tools::{Tool, ToolSet};

/// 构建工具时提供给各能力的运行时上下文
#[derive(Clone)]
pub struct CapabilityContext {
    pub store: Arc<StateStore>,
    /// 动态加载器；为 None 时 code_evolution 能力无法构建
    pub loader: Option<Arc<DynamicCapabilityLoader>>,
    pub config: Arc<AppConfig>,
    /// 脚本工具的工作目录（{{workspace}}）
    pub workspace: PathBuf,
}

impl CapabilityContext {
    pub fn new(store: Arc<StateStore>, config: Arc<AppConfig>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            store,
            loader: None,
            config,
            workspace: workspace.into(),
        }
    }

    pub fn with_loader(mut self, loader: Arc<DynamicCapabilityLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

/// 提供者的返回值
pub type ProviderResult = Result<Vec<Arc<dyn Tool>>, String>;

/// 工具提供者：给定上下文，产出该能力的工具列表；失败（如缺少可选依赖）返回 Err
pub trait ToolProvider: Send + Sync {
    fn build_tools(&self, ctx: &CapabilityContext) -> ProviderResult;
}

impl<F> ToolProvider for F
where
    F: Fn(&CapabilityContext) -> ProviderResult + Send + Sync,
{
    fn build_tools(&self, ctx: &CapabilityContext) -> ProviderResult {
        self(ctx)
    }
}

/// 能力来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityOrigin {
    BuiltIn,
    /// 由动态加载器从模块文件注册
    Dynamic(PathBuf),
}

/// 注册表条目，创建后不再修改
#[derive(Clone)]
pub struct CapabilityEntry {
    pub id: String,
    /// 该能力提供的工具名；注册时与已有条目的工具名不得重复
    pub tools: Vec<String>,
    pub provider: Arc<dyn ToolProvider>,
    pub policy: EnablementPolicy,
    pub origin: CapabilityOrigin,
}

impl std::fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("id", &self.id)
            .field("tools", &self.tools)
            .field("policy", &self.policy)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// 每个条目在一次枚举中的启用判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnablementDecision {
    pub id: String,
    pub enabled: bool,
    pub reason: String,
}

/// 枚举过程中的非致命告警
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityWarning {
    pub id: String,
    pub message: String,
}

/// 一次枚举的结果
#[derive(Default)]
pub struct EnumeratedTools {
    pub tools: ToolSet,
    pub decisions: Vec<EnablementDecision>,
    pub warnings: Vec<CapabilityWarning>,
}

/// 能力注册表
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<Vec<CapabilityEntry>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置能力；tools 为提供者会产出的工具名
    pub async fn register(
        &self,
        id: &str,
        tools: &[&str],
        provider: Arc<dyn ToolProvider>,
        policy: EnablementPolicy,
    ) -> Result<(), CapabilityError> {
        self.register_entry(CapabilityEntry {
            id: id.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            provider,
            policy,
            origin: CapabilityOrigin::BuiltIn,
        })
        .await
    }

    /// 注册条目；id 已存在返回 Conflict，工具名已被其他能力占用返回 ToolNameTaken，两种情况原条目都不变
    pub async fn register_entry(&self, entry: CapabilityEntry) -> Result<(), CapabilityError> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(CapabilityError::Conflict(entry.id));
        }
        for tool in &entry.tools {
            if let Some(owner) = entries.iter().find(|e| e.tools.contains(tool)) {
                return Err(CapabilityError::ToolNameTaken {
                    id: entry.id.clone(),
                    tool: tool.clone(),
                    owner: owner.id.clone(),
                });
            }
        }
        tracing::info!(capability = %entry.id, policy = ?entry.policy, "capability registered");
        entries.push(entry);
        Ok(())
    }

    /// 提供该工具名的能力 id
    pub async fn tool_owner(&self, tool: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.tools.iter().any(|t| t == tool))
            .map(|e| e.id.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.iter().any(|e| e.id == id)
    }

    /// 按注册顺序返回全部 id
    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.iter().map(|e| e.id.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 枚举工具：enabled_only 为 true 时跳过策略未开启的能力
    pub async fn enumerate_tools(&self, ctx: &CapabilityContext, enabled_only: bool) -> EnumeratedTools {
        // 先拷贝快照再调用提供者，避免提供者执行期间持锁
        let entries: Vec<CapabilityEntry> = self.entries.read().await.clone();
        let mut result = EnumeratedTools::default();

        for entry in entries {
            let policy_on = entry.policy.is_enabled();
            let enabled = policy_on || !enabled_only;
            let reason = if policy_on {
                entry.policy.describe()
            } else if enabled {
                format!("{} (ignored: enabled_only=false)", entry.policy.describe())
            } else {
                format!("{} (flag not set)", entry.policy.describe())
            };
            result.decisions.push(EnablementDecision {
                id: entry.id.clone(),
                enabled,
                reason,
            });
            if !enabled {
                continue;
            }

            match entry.provider.build_tools(ctx) {
                Ok(tools) => {
                    for tool in tools {
                        let name = tool.name().to_string();
                        if !result.tools.insert(tool) {
                            tracing::warn!(capability = %entry.id, tool = %name, "duplicate tool name skipped");
                            result.warnings.push(CapabilityWarning {
                                id: entry.id.clone(),
                                message: format!("tool '{}' already provided by another capability", name),
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(capability = %entry.id, error = %e, "capability skipped");
                    result.warnings.push(CapabilityWarning {
                        id: entry.id.clone(),
                        message: format!("Capability {} skipped: {}", entry.id, e),
                    });
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;

    fn ctx() -> (tempfile::TempDir, CapabilityContext) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path().join("state.json")).unwrap());
        let ctx = CapabilityContext::new(store, Arc::new(AppConfig::default()), dir.path());
        (dir, ctx)
    }

    fn provider(tool_names: &'static [&'static str]) -> Arc<dyn ToolProvider> {
        Arc::new(move |_: &CapabilityContext| -> ProviderResult {
            Ok(tool_names
                .iter()
                .map(|n| {
                    Arc::new(FnTool::new(n, "test tool", serde_json::json!({}), |_| Ok("ok".into())))
                        as Arc<dyn Tool>
                })
                .collect())
        })
    }

    fn failing_provider() -> Arc<dyn ToolProvider> {
        Arc::new(|_: &CapabilityContext| -> ProviderResult { Err("missing dependency".to_string()) })
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = CapabilityRegistry::new();
        registry
            .register("alpha", &["a1"], provider(&["a1"]), EnablementPolicy::Always)
            .await
            .unwrap();
        let err = registry
            .register("alpha", &["other"], provider(&["other"]), EnablementPolicy::Always)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Conflict(ref id) if id == "alpha"));
        assert_eq!(registry.ids().await, vec!["alpha".to_string()]);

        let (_dir, ctx) = ctx();
        let tools = registry.enumerate_tools(&ctx, true).await;
        assert_eq!(tools.tools.tool_names(), vec!["a1".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped_with_warning() {
        let registry = CapabilityRegistry::new();
        registry.register("first", &["f"], provider(&["f"]), EnablementPolicy::Always).await.unwrap();
        registry.register("broken", &[], failing_provider(), EnablementPolicy::Always).await.unwrap();
        registry.register("last", &["l"], provider(&["l"]), EnablementPolicy::Always).await.unwrap();

        let (_dir, ctx) = ctx();
        let result = registry.enumerate_tools(&ctx, true).await;
        assert_eq!(result.tools.tool_names(), vec!["f".to_string(), "l".to_string()]);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].id, "broken");
        assert!(result.warnings[0].message.contains("missing dependency"));
        assert_eq!(result.decisions.len(), 3);
    }

    #[tokio::test]
    async fn test_env_gated_capability() {
        // 每个测试用独立的变量名，避免并行测试互相干扰
        const FLAG: &str = "SPROUT_TEST_REGISTRY_GATE";
        let registry = CapabilityRegistry::new();
        registry.register("base", &["b"], provider(&["b"]), EnablementPolicy::Always).await.unwrap();
        registry
            .register("gated", &["g"], provider(&["g"]), EnablementPolicy::EnvGated(FLAG.into()))
            .await
            .unwrap();
        let (_dir, ctx) = ctx();

        std::env::remove_var(FLAG);
        let result = registry.enumerate_tools(&ctx, true).await;
        assert!(!result.tools.contains("g"));
        let gated = result.decisions.iter().find(|d| d.id == "gated").unwrap();
        assert!(!gated.enabled);

        for off in ["0", "false"] {
            std::env::set_var(FLAG, off);
            assert!(!registry.enumerate_tools(&ctx, true).await.tools.contains("g"));
        }
        for on in ["1", "TRUE", "yes"] {
            std::env::set_var(FLAG, on);
            assert!(registry.enumerate_tools(&ctx, true).await.tools.contains("g"));
        }

        std::env::remove_var(FLAG);
        let all = registry.enumerate_tools(&ctx, false).await;
        assert_eq!(all.tools.tool_names(), vec!["b".to_string(), "g".to_string()]);
    }

    #[tokio::test]
    async fn test_declared_tool_name_must_be_free() {
        let registry = CapabilityRegistry::new();
        registry.register("one", &["same"], provider(&["same"]), EnablementPolicy::Always).await.unwrap();
        let err = registry
            .register("two", &["other", "same"], provider(&["other", "same"]), EnablementPolicy::Always)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::ToolNameTaken { ref tool, ref owner, .. } if tool == "same" && owner == "one"
        ));
        assert!(!registry.contains("two").await);
        assert_eq!(registry.tool_owner("same").await.as_deref(), Some("one"));
        assert_eq!(registry.tool_owner("other").await, None);
    }

    #[tokio::test]
    async fn test_undeclared_duplicate_tool_is_skipped_with_warning() {
        let registry = CapabilityRegistry::new();
        registry.register("one", &["same"], provider(&["same"]), EnablementPolicy::Always).await.unwrap();
        // 提供者产出了未声明的工具名
        registry.register("two", &[], provider(&["same"]), EnablementPolicy::Always).await.unwrap();
        let (_dir, ctx) = ctx();
        let result = registry.enumerate_tools(&ctx, true).await;
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.warnings[0].id, "two");
    }
}
