//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPROUT__*` 覆盖（双下划线表示嵌套，如 `SPROUT__LLM__PROVIDER=anthropic`）。
//! 另外兼容几个常用的扁平变量：LLM_PROVIDER、MODEL_NAME、ASSISTANT_DATA_FILE、NIM_BASE_URL。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub capabilities: CapabilitiesSection,
    pub tools: ToolsSection,
}

/// [app] 段：数据文件与工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 任务/笔记 JSON 文件
    pub data_file: PathBuf,
    /// 脚本工具的工作目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            data_file: PathBuf::from("assistant_state.json"),
            workspace_root: None,
        }
    }
}

impl AppSection {
    pub fn workspace(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// [llm] 段：提供方、模型与请求参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / anthropic / google / nvidia / deepseek / mock
    pub provider: String,
    /// 未设置时使用提供方的回退模型
    pub model: Option<String>,
    /// 覆盖提供方的默认端点
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            temperature: 0.2,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [capabilities] 段：动态能力模块目录与依赖安装
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapabilitiesSection {
    pub modules_dir: PathBuf,
    /// 安装命令与固定参数，依赖名追加在末尾
    pub install_command: Vec<String>,
    pub install_timeout_secs: u64,
    /// 启动时加载 modules_dir 中已有的模块
    pub load_on_startup: bool,
}

impl Default for CapabilitiesSection {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("capabilities"),
            install_command: vec!["pip".into(), "install".into(), "-q".into()],
            install_timeout_secs: 120,
            load_on_startup: true,
        }
    }
}

/// [tools] 段：工具超时与单轮步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 单轮内模型调用次数上限
    pub max_steps: usize,
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_steps: 20,
            search: SearchSection::default(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub timeout_secs: u64,
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_results: 8,
        }
    }
}

/// 扁平环境变量 -> 配置键
const ENV_SHORTCUTS: &[(&str, &str)] = &[
    ("LLM_PROVIDER", "llm.provider"),
    ("MODEL_NAME", "llm.model"),
    ("ASSISTANT_DATA_FILE", "app.data_file"),
];

/// 从 config 目录加载配置，环境变量 SPROUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 SPROUT__*（双下划线表示嵌套键）
/// 4. 最后应用扁平变量（LLM_PROVIDER 等），非空时优先
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SPROUT")
            .separator("__")
            .try_parsing(true),
    );

    for (var, key) in ENV_SHORTCUTS {
        let value = std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        builder = builder.set_override_option(*key, value)?;
    }

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取 prompt 覆盖文件（config/prompts/<name>.md），不存在时返回 None
pub fn load_prompt(name: &str) -> Option<String> {
    [
        format!("config/prompts/{}.md", name),
        format!("../config/prompts/{}.md", name),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}
