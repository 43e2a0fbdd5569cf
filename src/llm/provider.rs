//! 提供方选择：provider 名 -> OpenAI 兼容端点、API Key 变量与回退模型
//!
//! 未配置模型名时使用各提供方的回退模型；不支持的提供方返回 ProviderError。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

pub const NIM_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1/";
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 支持的模型提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Nvidia,
    DeepSeek,
    Mock,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Anthropic,
        ProviderKind::DeepSeek,
        ProviderKind::Google,
        ProviderKind::Mock,
        ProviderKind::Nvidia,
        ProviderKind::OpenAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Nvidia => "nvidia",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Mock => "mock",
        }
    }

    /// 未指定模型时的回退模型
    pub fn fallback_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-5-mini",
            ProviderKind::Anthropic => "claude-sonnet-4-5",
            ProviderKind::Google => "gemini-2.5-pro",
            ProviderKind::Nvidia => "meta/llama-3.1-8b-instruct",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Mock => "mock",
        }
    }

    /// None 表示 async-openai 的默认端点
    pub fn default_base_url(&self) -> Option<String> {
        match self {
            ProviderKind::OpenAi | ProviderKind::Mock => None,
            ProviderKind::Anthropic => Some(ANTHROPIC_BASE_URL.to_string()),
            ProviderKind::Google => Some(GOOGLE_BASE_URL.to_string()),
            ProviderKind::Nvidia => Some(
                std::env::var("NIM_BASE_URL")
                    .map(|u| u.trim().trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| NIM_BASE_URL.to_string()),
            ),
            ProviderKind::DeepSeek => Some(DEEPSEEK_BASE_URL.to_string()),
        }
    }

    /// 依次尝试的 API Key 环境变量
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderKind::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::Nvidia => &["NIM_API_KEY", "NVIDIA_API_KEY"],
            ProviderKind::DeepSeek => &["DEEPSEEK_API_KEY"],
            ProviderKind::Mock => &[],
        }
    }

    fn api_key(&self) -> Option<String> {
        self.api_key_vars()
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = ProviderKind::ALL.iter().map(|p| p.as_str()).collect();
                AgentError::ProviderError(format!(
                    "Unsupported provider '{}'. Use one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// 选定的提供方与模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub provider: ProviderKind,
    pub model: String,
    pub used_fallback: bool,
}

impl ModelChoice {
    pub fn resolve(cfg: &LlmSection) -> Result<Self, AgentError> {
        let provider: ProviderKind = cfg.provider.parse()?;
        let explicit = cfg.model.as_deref().map(str::trim).filter(|m| !m.is_empty());
        Ok(match explicit {
            Some(model) => ModelChoice {
                provider,
                model: model.to_string(),
                used_fallback: false,
            },
            None => ModelChoice {
                provider,
                model: provider.fallback_model().to_string(),
                used_fallback: true,
            },
        })
    }
}

/// 按 [llm] 配置创建客户端；缺少 API Key 时返回 ProviderError
pub fn create_llm(cfg: &LlmSection) -> Result<(Arc<dyn LlmClient>, ModelChoice), AgentError> {
    let choice = ModelChoice::resolve(cfg)?;
    if choice.provider == ProviderKind::Mock {
        tracing::warn!("Using Mock LLM");
        return Ok((Arc::new(MockLlmClient), choice));
    }

    let api_key = choice.provider.api_key().ok_or_else(|| {
        AgentError::ProviderError(format!(
            "{} requires an API key ({})",
            choice.provider,
            choice.provider.api_key_vars().join(" or ")
        ))
    })?;
    let base_url = cfg.base_url.clone().or_else(|| choice.provider.default_base_url());

    tracing::info!(
        provider = %choice.provider,
        model = %choice.model,
        fallback = choice.used_fallback,
        "Using LLM"
    );
    let client = OpenAiClient::new(base_url.as_deref(), &choice.model, &api_key)
        .with_temperature(cfg.temperature)
        .with_request_timeout(cfg.timeouts.request);
    Ok((Arc::new(client), choice))
}
