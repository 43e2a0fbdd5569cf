//! 能力启用策略
//!
//! Always：始终启用；EnvGated(name)：环境变量 name 的值（去空白、忽略大小写）为 1 / true / yes 时启用。

/// 视为「开启」的环境变量取值
const TRUTHY: &[&str] = &["1", "true", "yes"];

/// 启用策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnablementPolicy {
    Always,
    EnvGated(String),
}

impl EnablementPolicy {
    /// 由可选环境变量名构建：None 即 Always
    pub fn from_env_var(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => EnablementPolicy::EnvGated(n.to_string()),
            None => EnablementPolicy::Always,
        }
    }

    /// 按当前进程环境求值
    pub fn is_enabled(&self) -> bool {
        self.is_enabled_with(|name| std::env::var(name).ok())
    }

    /// 用给定的查找函数求值（便于测试与自定义环境来源）
    pub fn is_enabled_with<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            EnablementPolicy::Always => true,
            EnablementPolicy::EnvGated(name) => lookup(name).map(|v| is_truthy(&v)).unwrap_or(false),
        }
    }

    /// 启用判定的原因说明（写入 EnablementDecision）
    pub fn describe(&self) -> String {
        match self {
            EnablementPolicy::Always => "always enabled".to_string(),
            EnablementPolicy::EnvGated(name) => format!("gated by {}", name),
        }
    }
}

/// 环境变量值是否为真
pub fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    TRUTHY.contains(&v.as_str())
}
