//! Agent 构建器：进程级组件的统一装配
//!
//! CLI 与 HTTP 共用：配置 -> 存储 -> 注册表（内置能力）-> 动态加载器（可选加载已有模块）-> LLM。
//! 产出的 AgentRuntime 可为每个会话创建 ConversationOrchestrator。

use std::path::PathBuf;
use std::sync::Arc;

use crate::capabilities::{
    register_builtins, CapabilityContext, CapabilityRegistry, CommandInstaller, DependencyInstaller,
    DynamicCapabilityLoader, ModuleLoader,
};
use crate::config::AppConfig;
use crate::core::{AgentError, ConversationOrchestrator};
use crate::llm::{create_llm, LlmClient, ModelChoice};
use crate::memory::StateStore;
use crate::react::PromptSet;

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    installer: Option<Arc<dyn DependencyInstaller>>,
    module_loader: Option<Arc<dyn ModuleLoader>>,
    prompts: Option<PromptSet>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            installer: None,
            module_loader: None,
            prompts: None,
        }
    }

    /// 指定 LLM（测试用脚本化客户端）；未指定时按 [llm] 配置创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn with_module_loader(mut self, module_loader: Arc<dyn ModuleLoader>) -> Self {
        self.module_loader = Some(module_loader);
        self
    }

    /// 指定 prompt；未指定时读取 config/prompts 覆盖文件或使用内置 prompt
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub async fn build(self) -> Result<AgentRuntime, AgentError> {
        let config = Arc::new(self.config);

        let workspace = config.app.workspace();
        std::fs::create_dir_all(&workspace)
            .map_err(|e| AgentError::ConfigError(format!("workspace {}: {}", workspace.display(), e)))?;
        let workspace = workspace.canonicalize().unwrap_or(workspace);

        let store = Arc::new(
            StateStore::open(&config.app.data_file)
                .map_err(|e| AgentError::ConfigError(format!("data file: {}", e)))?,
        );

        let registry = Arc::new(CapabilityRegistry::new());
        register_builtins(&registry)
            .await
            .map_err(|e| AgentError::ConfigError(e.to_string()))?;

        let caps = &config.capabilities;
        let installer = self.installer.unwrap_or_else(|| {
            Arc::new(CommandInstaller::new(
                caps.install_command.clone(),
                caps.install_timeout_secs,
            )) as Arc<dyn DependencyInstaller>
        });
        let mut loader = DynamicCapabilityLoader::new(Arc::clone(&registry), caps.modules_dir.clone(), installer);
        if let Some(module_loader) = self.module_loader {
            loader = loader.with_module_loader(module_loader);
        }
        let loader = Arc::new(loader);
        if caps.load_on_startup {
            loader.load_existing().await;
        }

        let (llm, model) = match self.llm {
            Some(llm) => (llm, None),
            None => {
                let (llm, choice) = create_llm(&config.llm)?;
                (llm, Some(choice))
            }
        };

        let context = CapabilityContext::new(Arc::clone(&store), Arc::clone(&config), workspace.clone())
            .with_loader(Arc::clone(&loader));

        Ok(AgentRuntime {
            config,
            workspace,
            store,
            registry,
            loader,
            context,
            llm,
            model,
            prompts: self.prompts.unwrap_or_else(PromptSet::load),
        })
    }
}

/// 进程级运行时：所有会话共享注册表、加载器、存储与 LLM
pub struct AgentRuntime {
    config: Arc<AppConfig>,
    workspace: PathBuf,
    store: Arc<StateStore>,
    registry: Arc<CapabilityRegistry>,
    loader: Arc<DynamicCapabilityLoader>,
    context: CapabilityContext,
    llm: Arc<dyn LlmClient>,
    model: Option<ModelChoice>,
    prompts: PromptSet,
}

impl AgentRuntime {
    pub fn builder(config: AppConfig) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    /// 新会话
    pub async fn new_session(&self) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            Arc::clone(&self.registry),
            self.context.clone(),
            Arc::clone(&self.llm),
            self.prompts.clone(),
        )
        .await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspace(&self) -> &PathBuf {
        &self.workspace
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<DynamicCapabilityLoader> {
        &self.loader
    }

    /// 按配置创建 LLM 时的选择结果；注入 LLM 时为 None
    pub fn model(&self) -> Option<&ModelChoice> {
        self.model.as_ref()
    }
}
