//! 依赖安装
//!
//! 新能力声明的依赖通过宿主包管理器安装（默认 `pip install -q <deps>`），无 shell、带超时。
//! 超时与非零退出都视为安装失败。

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// 依赖安装器
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// 安装依赖；Err 为可读的失败原因
    async fn install(&self, deps: &[String]) -> Result<(), String>;
}

/// 调用外部包管理器命令安装
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    /// 命令与固定参数，如 ["pip", "install", "-q"]；依赖名追加在末尾
    command: Vec<String>,
    timeout: Duration,
}

impl CommandInstaller {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    async fn install(&self, deps: &[String]) -> Result<(), String> {
        let (program, fixed_args) = self
            .command
            .split_first()
            .ok_or_else(|| "no install command configured".to_string())?;

        tracing::info!(program = %program, deps = ?deps, "installing capability dependencies");
        let child = Command::new(program)
            .args(fixed_args)
            .args(deps)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("{} spawn failed: {}", program, e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("{} timed out after {}s", program, self.timeout.as_secs()))?
            .map_err(|e| format!("{} wait failed: {}", program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// 把逗号分隔的依赖串拆成列表（去空白、去空项）
pub fn split_deps(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}
