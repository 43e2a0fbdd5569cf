//! 能力模块清单（capability manifest）
//!
//! 动态能力以 TOML 文件保存在 modules_dir/<id>.toml，约定：
//!
//! ```toml
//! [register]                    # 恰好一次注册
//! id = "weather"
//! enable_env = "ENABLE_WEATHER"   # 可选，缺省为始终启用
//!
//! [[tools]]
//! name = "get_weather"
//! description = "Current weather for a city"
//! program = "curl"
//! args = ["-s", "https://wttr.in/{{city}}?format=3"]
//! timeout_secs = 30             # 可选
//! [tools.parameters]            # 可选，JSON Schema
//! type = "object"
//! ```
//!
//! 加载只做结构校验，不保证工具语义正确。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::registry::{CapabilityContext, ProviderResult, ToolProvider};
use crate::capabilities::EnablementPolicy;
use crate::tools::{ScriptTool, Tool};

/// [register] 段：模块的注册声明
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterSection {
    pub id: String,
    #[serde(default)]
    pub enable_env: Option<String>,
}

/// [[tools]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolSpec {
    pub fn parameters_schema(&self) -> Value {
        self.parameters.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            })
        })
    }
}

/// 完整清单
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityManifest {
    pub register: Option<RegisterSection>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// 清洗能力 id：只保留字母、数字、下划线
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl CapabilityManifest {
    /// 解析 TOML 文本
    pub fn parse(source: &str) -> Result<Self, String> {
        toml::from_str(source).map_err(|e| format!("invalid manifest: {}", e))
    }

    /// 结构校验：必须注册且仅注册 expected_id，至少一个合法工具
    pub fn validate(&self, expected_id: &str) -> Result<&RegisterSection, String> {
        let register = self
            .register
            .as_ref()
            .ok_or_else(|| "module does not register a capability ([register] table missing)".to_string())?;
        if register.id != expected_id {
            return Err(format!(
                "module registers '{}' but was added as '{}'",
                register.id, expected_id
            ));
        }
        if self.tools.is_empty() {
            return Err("module declares no [[tools]]".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if !is_identifier(&tool.name) {
                return Err(format!("invalid tool name '{}'", tool.name));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(format!("duplicate tool name '{}'", tool.name));
            }
            if tool.program.trim().is_empty() {
                return Err(format!("tool '{}' has no program", tool.name));
            }
            if let Some(params) = &tool.parameters {
                if !params.is_object() {
                    return Err(format!("tool '{}' parameters must be a table", tool.name));
                }
            }
        }
        Ok(register)
    }

    pub fn policy(&self) -> EnablementPolicy {
        let env = self.register.as_ref().and_then(|r| r.enable_env.as_deref());
        EnablementPolicy::from_env_var(env)
    }

    /// 转成工具提供者：每次枚举按上下文生成 ScriptTool
    pub fn into_provider(self) -> Arc<dyn ToolProvider> {
        let specs = self.tools;
        Arc::new(move |ctx: &CapabilityContext| -> ProviderResult {
            let default_timeout = ctx.config.tools.tool_timeout_secs;
            Ok(specs
                .iter()
                .map(|spec| Arc::new(ScriptTool::new(spec, &ctx.workspace, default_timeout)) as Arc<dyn Tool>)
                .collect())
        })
    }
}
