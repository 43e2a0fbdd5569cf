//! 动态能力加载器
//!
//! 单次添加请求的状态机（终态 Registered / RolledBack）：
//!
//! Received -> Validating -> WritingModule -> InstallingDependencies -> LoadingModule -> Registering -> Registered
//!
//! 任一阶段失败进入 RolledBack 并删除已写入的模块文件；唯一例外是依赖安装失败：
//! 进入 AwaitingDependencies，模块文件保留、不加载，之后可用 resume 只重试安装与加载。
//! Validating 到 Registering 之间持有同一把互斥锁，两个会话同时添加同名能力时只有一个成功。
//!
//! 「加载」通过 ModuleLoader trait 完成，默认实现解析 TOML 清单并执行其中的注册声明；
//! 以后可替换为进程外执行等更安全的机制，而不影响注册表和编排器。
//! 注意：模块内容由模型生成，加载后即可运行任意程序，这里不做隔离。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::capabilities::installer::{split_deps, DependencyInstaller};
use crate::capabilities::module::{sanitize_id, CapabilityManifest};
use crate::capabilities::registry::{CapabilityEntry, CapabilityOrigin, CapabilityRegistry};
use crate::core::CapabilityError;

/// 模块文件扩展名
pub const MODULE_EXTENSION: &str = "toml";

/// 加载状态机的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStage {
    Received,
    Validating,
    WritingModule,
    InstallingDependencies,
    LoadingModule,
    Registering,
    Registered,
    RolledBack,
    /// 依赖安装失败，模块文件保留等待 resume
    AwaitingDependencies,
}

/// 一次能力添加请求（由 add_capability 工具产生，只消费一次）
#[derive(Debug, Clone)]
pub struct CapabilityAdditionRequest {
    pub id: String,
    pub source_code: String,
    pub dependencies: Vec<String>,
}

impl CapabilityAdditionRequest {
    pub fn new(id: impl Into<String>, source_code: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            id: id.into(),
            source_code: source_code.into(),
            dependencies,
        }
    }

    /// 由工具参数构建：pip_deps 为逗号分隔
    pub fn from_tool_args(capability_name: &str, code: &str, pip_deps: &str) -> Self {
        Self::new(capability_name, code, split_deps(pip_deps))
    }
}

/// 成功添加的报告
#[derive(Debug, Clone)]
pub struct AdditionReport {
    pub id: String,
    pub message: String,
    pub trace: Vec<LoaderStage>,
}

/// 模块加载：读取模块、执行其注册声明
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// 加载 path 处的模块，模块须向 registry 注册且仅注册 expected_id；Err 为失败原因
    async fn load(&self, expected_id: &str, path: &Path, registry: &CapabilityRegistry) -> Result<(), String>;
}

/// 默认模块加载器：TOML 清单
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestModuleLoader;

#[async_trait]
impl ModuleLoader for ManifestModuleLoader {
    async fn load(&self, expected_id: &str, path: &Path, registry: &CapabilityRegistry) -> Result<(), String> {
        let source = std::fs::read_to_string(path).map_err(|e| format!("read failed: {}", e))?;
        let manifest = CapabilityManifest::parse(&source)?;
        manifest.validate(expected_id)?;
        let policy = manifest.policy();
        let tools = manifest.tools.iter().map(|t| t.name.clone()).collect();
        registry
            .register_entry(CapabilityEntry {
                id: expected_id.to_string(),
                tools,
                provider: manifest.into_provider(),
                policy,
                origin: CapabilityOrigin::Dynamic(path.to_path_buf()),
            })
            .await
            .map_err(|e| e.to_string())
    }
}

/// 记录并输出阶段迁移
struct StageTrace {
    id: String,
    stages: Vec<LoaderStage>,
}

impl StageTrace {
    fn new(id: &str) -> Self {
        let mut trace = Self {
            id: id.to_string(),
            stages: Vec::new(),
        };
        trace.enter(LoaderStage::Received);
        trace
    }

    fn enter(&mut self, stage: LoaderStage) {
        tracing::debug!(capability = %self.id, stage = ?stage, "capability loader transition");
        self.stages.push(stage);
    }

    fn rename(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn roll_back(&mut self, reason: &str) {
        tracing::warn!(capability = %self.id, reason = %reason, "capability addition rolled back");
        self.enter(LoaderStage::RolledBack);
    }

    fn retain(&mut self, reason: &str) {
        tracing::warn!(capability = %self.id, reason = %reason, "dependency install failed, module file retained");
        self.enter(LoaderStage::AwaitingDependencies);
    }
}

/// 动态能力加载器
pub struct DynamicCapabilityLoader {
    registry: Arc<CapabilityRegistry>,
    modules_dir: PathBuf,
    installer: Arc<dyn DependencyInstaller>,
    module_loader: Arc<dyn ModuleLoader>,
    /// 串行化所有添加；锁内保存最近一次 add / resume 的阶段记录
    guard: Mutex<Vec<LoaderStage>>,
}

impl DynamicCapabilityLoader {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        modules_dir: impl Into<PathBuf>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> Self {
        Self {
            registry,
            modules_dir: modules_dir.into(),
            installer,
            module_loader: Arc::new(ManifestModuleLoader),
            guard: Mutex::new(Vec::new()),
        }
    }

    /// 替换模块加载机制
    pub fn with_module_loader(mut self, module_loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = module_loader;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    pub fn module_path(&self, id: &str) -> PathBuf {
        self.modules_dir.join(format!("{}.{}", id, MODULE_EXTENSION))
    }

    /// 最近一次 add / resume 经过的阶段（失败时可看出停在哪一步）
    pub async fn last_trace(&self) -> Vec<LoaderStage> {
        self.guard.lock().await.clone()
    }

    /// 处理一次添加请求
    pub async fn add(&self, request: CapabilityAdditionRequest) -> Result<AdditionReport, CapabilityError> {
        let mut last = self.guard.lock().await;
        let mut trace = StageTrace::new(&request.id);
        let result = self.add_locked(request, &mut trace).await;
        *last = trace.stages;
        result
    }

    async fn add_locked(
        &self,
        request: CapabilityAdditionRequest,
        trace: &mut StageTrace,
    ) -> Result<AdditionReport, CapabilityError> {
        trace.enter(LoaderStage::Validating);
        let id = sanitize_id(&request.id);
        if id.is_empty() {
            trace.roll_back("empty id after sanitizing");
            return Err(CapabilityError::Validation(request.id));
        }
        trace.rename(&id);
        let path = self.module_path(&id);
        if path.exists() || self.registry.contains(&id).await {
            trace.roll_back("id already exists");
            return Err(CapabilityError::Conflict(id));
        }

        trace.enter(LoaderStage::WritingModule);
        if let Err(source) = self.write_module(&path, &request.source_code) {
            let _ = std::fs::remove_file(&path);
            trace.roll_back(&source.to_string());
            return Err(CapabilityError::Write { id, source });
        }

        trace.enter(LoaderStage::InstallingDependencies);
        self.install(&id, &request.dependencies, trace).await?;

        self.load_and_confirm(&id, &path, trace).await
    }

    /// 依赖安装失败后重试：只重新安装依赖并加载已保留的模块文件
    pub async fn resume(&self, raw_id: &str, dependencies: &[String]) -> Result<AdditionReport, CapabilityError> {
        let mut last = self.guard.lock().await;
        let mut trace = StageTrace::new(raw_id);
        let result = self.resume_locked(raw_id, dependencies, &mut trace).await;
        *last = trace.stages;
        result
    }

    async fn resume_locked(
        &self,
        raw_id: &str,
        dependencies: &[String],
        trace: &mut StageTrace,
    ) -> Result<AdditionReport, CapabilityError> {
        trace.enter(LoaderStage::Validating);
        let id = sanitize_id(raw_id);
        if id.is_empty() {
            trace.roll_back("empty id after sanitizing");
            return Err(CapabilityError::Validation(raw_id.to_string()));
        }
        trace.rename(&id);
        if self.registry.contains(&id).await {
            trace.roll_back("id already registered");
            return Err(CapabilityError::Conflict(id));
        }
        let path = self.module_path(&id);
        if !path.exists() {
            trace.roll_back("no retained module file");
            return Err(CapabilityError::Load {
                id,
                reason: "no module file to resume".to_string(),
            });
        }

        trace.enter(LoaderStage::InstallingDependencies);
        self.install(&id, dependencies, trace).await?;

        self.load_and_confirm(&id, &path, trace).await
    }

    /// 启动时加载 modules_dir 下已有的模块（按文件名排序）；失败的模块记录告警并跳过，文件保留
    pub async fn load_existing(&self) -> Vec<String> {
        let _guard = self.guard.lock().await;
        let mut loaded = Vec::new();

        let entries = match std::fs::read_dir(&self.modules_dir) {
            Ok(entries) => entries,
            Err(_) => return loaded,
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == MODULE_EXTENSION))
            .collect();
        paths.sort();

        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if sanitize_id(&id) != id || self.registry.contains(&id).await {
                tracing::warn!(path = %path.display(), "skipping capability module");
                continue;
            }
            match self.module_loader.load(&id, &path, &self.registry).await {
                Ok(()) => loaded.push(id),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to load capability module"),
            }
        }

        tracing::info!("Loaded {} capability modules", loaded.len());
        loaded
    }

    fn write_module(&self, path: &Path, source: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.modules_dir)?;
        std::fs::write(path, source.trim())
    }

    async fn install(&self, id: &str, deps: &[String], trace: &mut StageTrace) -> Result<(), CapabilityError> {
        if deps.is_empty() {
            return Ok(());
        }
        self.installer.install(deps).await.map_err(|reason| {
            trace.retain(&reason);
            CapabilityError::DependencyInstall {
                id: id.to_string(),
                reason,
            }
        })
    }

    async fn load_and_confirm(
        &self,
        id: &str,
        path: &Path,
        trace: &mut StageTrace,
    ) -> Result<AdditionReport, CapabilityError> {
        trace.enter(LoaderStage::LoadingModule);
        if let Err(reason) = self.module_loader.load(id, path, &self.registry).await {
            let _ = std::fs::remove_file(path);
            trace.roll_back(&reason);
            return Err(CapabilityError::Load {
                id: id.to_string(),
                reason,
            });
        }

        trace.enter(LoaderStage::Registering);
        if !self.registry.contains(id).await {
            let _ = std::fs::remove_file(path);
            let reason = "module loaded but did not register".to_string();
            trace.roll_back(&reason);
            return Err(CapabilityError::Load {
                id: id.to_string(),
                reason,
            });
        }

        trace.enter(LoaderStage::Registered);
        tracing::info!(capability = %id, "capability added");
        Ok(AdditionReport {
            id: id.to_string(),
            message: format!(
                "Capability '{}' added successfully. The new tools are now available. Ask the user to repeat their request.",
                id
            ),
            trace: trace.stages.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopInstaller;

    #[async_trait]
    impl DependencyInstaller for NoopInstaller {
        async fn install(&self, _deps: &[String]) -> Result<(), String> {
            Ok(())
        }
    }

    struct BrokenInstaller;

    #[async_trait]
    impl DependencyInstaller for BrokenInstaller {
        async fn install(&self, _deps: &[String]) -> Result<(), String> {
            Err("index unreachable".to_string())
        }
    }

    /// 模块加载「成功」但不注册
    struct SilentLoader;

    #[async_trait]
    impl ModuleLoader for SilentLoader {
        async fn load(&self, _id: &str, _path: &Path, _registry: &CapabilityRegistry) -> Result<(), String> {
            Ok(())
        }
    }

    const MODULE: &str = "[register]\nid = \"greet\"\n\n[[tools]]\nname = \"greet\"\ndescription = \"Say hello\"\nprogram = \"echo\"\nargs = [\"hello\"]\n";

    fn loader(dir: &Path) -> DynamicCapabilityLoader {
        DynamicCapabilityLoader::new(
            Arc::new(CapabilityRegistry::new()),
            dir.join("modules"),
            Arc::new(NoopInstaller),
        )
    }

    #[tokio::test]
    async fn test_full_trace_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        let report = loader
            .add(CapabilityAdditionRequest::new("greet", MODULE, vec![]))
            .await
            .unwrap();
        assert_eq!(
            report.trace,
            vec![
                LoaderStage::Received,
                LoaderStage::Validating,
                LoaderStage::WritingModule,
                LoaderStage::InstallingDependencies,
                LoaderStage::LoadingModule,
                LoaderStage::Registering,
                LoaderStage::Registered,
            ]
        );
        assert!(report.message.contains("Ask the user to repeat their request"));
        assert!(loader.module_path("greet").exists());
        assert!(loader.registry().contains("greet").await);
    }

    #[tokio::test]
    async fn test_module_that_does_not_register_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path()).with_module_loader(Arc::new(SilentLoader));
        let err = loader
            .add(CapabilityAdditionRequest::new("greet", MODULE, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Load { .. }));
        assert!(!loader.module_path("greet").exists());
    }

    #[tokio::test]
    async fn test_id_is_sanitized_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        let report = loader
            .add(CapabilityAdditionRequest::new("../gr-eet", MODULE, vec![]))
            .await
            .unwrap();
        assert_eq!(report.id, "greet");
        assert!(dir.path().join("modules").join("greet.toml").exists());
    }

    #[tokio::test]
    async fn test_module_reusing_builtin_tool_name_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        crate::capabilities::tasks_notes::register(loader.registry()).await.unwrap();

        let module = "[register]\nid = \"dupe\"\n\n[[tools]]\nname = \"add_task\"\ndescription = \"Shadow\"\nprogram = \"echo\"\n";
        let err = loader
            .add(CapabilityAdditionRequest::new("dupe", module, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Load { ref id, .. } if id == "dupe"));
        assert!(err.to_string().contains("add_task is already provided by capability tasks_notes"));
        assert!(!loader.module_path("dupe").exists());
        assert!(!loader.registry().contains("dupe").await);
        assert_eq!(loader.last_trace().await.last(), Some(&LoaderStage::RolledBack));
    }

    #[tokio::test]
    async fn test_dependency_failure_is_traced_as_awaiting() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DynamicCapabilityLoader::new(
            Arc::new(CapabilityRegistry::new()),
            dir.path().join("modules"),
            Arc::new(BrokenInstaller),
        );
        let err = loader
            .add(CapabilityAdditionRequest::new("greet", MODULE, vec!["requests".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::DependencyInstall { .. }));
        assert_eq!(
            loader.last_trace().await,
            vec![
                LoaderStage::Received,
                LoaderStage::Validating,
                LoaderStage::WritingModule,
                LoaderStage::InstallingDependencies,
                LoaderStage::AwaitingDependencies,
            ]
        );
        assert!(loader.module_path("greet").exists());
    }
}
