//! 代码进化能力（ENABLE_CODE_EVOLUTION 开启）：add_capability 工具
//!
//! 模型在缺少能力时生成一份能力模块清单，交给动态加载器落盘、安装依赖并注册。
//! 成功后编排器会在本轮结束时重建工具绑定。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::loader::{CapabilityAdditionRequest, DynamicCapabilityLoader};
use crate::capabilities::registry::{CapabilityContext, CapabilityRegistry, ProviderResult};
use crate::capabilities::EnablementPolicy;
use crate::core::CapabilityError;
use crate::tools::{str_arg, Tool};

pub const CAPABILITY_ID: &str = "code_evolution";
pub const ENABLE_CODE_EVOLUTION: &str = "ENABLE_CODE_EVOLUTION";
/// 编排器据此名字识别「能力已添加」
pub const ADD_CAPABILITY_TOOL: &str = "add_capability";
/// 写文件、加载以及等待加载器锁的余量
const ADD_CAPABILITY_HEADROOM_SECS: u64 = 60;

pub struct AddCapabilityTool {
    loader: Arc<DynamicCapabilityLoader>,
    timeout_secs: u64,
}

impl AddCapabilityTool {
    /// install_timeout_secs 为依赖安装超时；工具超时须大于它，安装超时才能由加载器报告
    pub fn new(loader: Arc<DynamicCapabilityLoader>, install_timeout_secs: u64) -> Self {
        Self {
            loader,
            timeout_secs: install_timeout_secs.saturating_add(ADD_CAPABILITY_HEADROOM_SECS),
        }
    }
}

#[async_trait]
impl Tool for AddCapabilityTool {
    fn name(&self) -> &str {
        ADD_CAPABILITY_TOOL
    }

    fn description(&self) -> &str {
        "Add a new capability when you cannot do something with current tools. \
         Use after web_search to find how to implement it. capability_name must be an identifier \
         (letters, digits, underscore, e.g. email_fetch). code must be a complete TOML capability module: \
         a [register] table whose id equals capability_name (optional enable_env), and one or more [[tools]] \
         entries with name, description, program, args (use {{param}} placeholders) and optional parameters schema. \
         pip_deps: comma-separated package names to install (e.g. 'imapclient,requests'). \
         Returns success/failure. If successful, the user can ask again and you will have the new tool."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "capability_name": {"type": "string", "description": "Identifier of the new capability"},
                "code": {"type": "string", "description": "Complete TOML capability module"},
                "pip_deps": {"type": "string", "description": "Comma-separated dependencies (optional)"}
            },
            "required": ["capability_name", "code"]
        })
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(self.timeout_secs)
    }

    /// 成功返回 Ok；任何加载失败返回 Err，编排器据此判断是否需要重建
    async fn execute(&self, args: Value) -> Result<String, String> {
        let request = CapabilityAdditionRequest::from_tool_args(
            str_arg(&args, "capability_name"),
            str_arg(&args, "code"),
            str_arg(&args, "pip_deps"),
        );
        match self.loader.add(request).await {
            Ok(report) => Ok(report.message),
            Err(e) => {
                tracing::warn!(capability = %e.capability_id(), error = %e, "add_capability failed");
                Err(e.to_string())
            }
        }
    }
}

pub async fn register(registry: &CapabilityRegistry) -> Result<(), CapabilityError> {
    registry
        .register(
            CAPABILITY_ID,
            &[ADD_CAPABILITY_TOOL],
            Arc::new(|ctx: &CapabilityContext| -> ProviderResult {
                let loader = ctx
                    .loader
                    .clone()
                    .ok_or_else(|| "no capability loader in context".to_string())?;
                let install_timeout = ctx.config.capabilities.install_timeout_secs;
                Ok(vec![Arc::new(AddCapabilityTool::new(loader, install_timeout)) as Arc<dyn Tool>])
            }),
            EnablementPolicy::EnvGated(ENABLE_CODE_EVOLUTION.to_string()),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::installer::DependencyInstaller;

    struct NoopInstaller;

    #[async_trait]
    impl DependencyInstaller for NoopInstaller {
        async fn install(&self, _deps: &[String]) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_capability_reports_loader_messages() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(CapabilityRegistry::new());
        let loader = Arc::new(DynamicCapabilityLoader::new(
            Arc::clone(&registry),
            dir.path(),
            Arc::new(NoopInstaller),
        ));
        let tool = AddCapabilityTool::new(loader, 120);
        assert_eq!(tool.timeout_secs(), Some(180));

        let err = tool
            .execute(serde_json::json!({"capability_name": "!!!", "code": ""}))
            .await
            .unwrap_err();
        assert_eq!(err, "Invalid capability_name: must be alphanumeric/underscore only.");

        let code = "[register]\nid = \"ping\"\n[[tools]]\nname = \"ping\"\ndescription = \"d\"\nprogram = \"echo\"\n";
        let ok = tool
            .execute(serde_json::json!({"capability_name": "ping", "code": code}))
            .await
            .unwrap();
        assert!(ok.starts_with("Capability 'ping' added successfully."));

        let err = tool
            .execute(serde_json::json!({"capability_name": "ping", "code": code}))
            .await
            .unwrap_err();
        assert!(err.contains("already exists"));
    }
}
