//! 脚本工具：由能力模块的 [[tools]] 条目生成，运行「程序 + 参数模板」
//!
//! 模板占位符写作 {{key}}，key 须为标识符；{{workspace}} 保留给数据目录，其余从模型传入的 args 取值。
//! 任一占位符没有对应参数（或参数为 null）时不执行，返回缺失参数列表。
//! 执行时不经 shell，模块内容由模型生成，这里不提供任何沙箱。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::capabilities::module::ToolSpec;
use crate::tools::Tool;

/// 保留占位符：数据目录
const WORKSPACE_KEY: &str = "workspace";

/// 执行器超时相对脚本自身超时的余量
const EXECUTOR_GRACE_SECS: u64 = 5;

/// 从模块清单构建的脚本工具
pub struct ScriptTool {
    name: String,
    description: String,
    parameters: Value,
    program: String,
    args_template: Vec<String>,
    workspace: PathBuf,
    timeout_secs: u64,
}

fn is_placeholder_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn arg_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 渲染一个模板；找不到值的占位符名记入 missing（去重），不是标识符的 {{...}} 原样保留
fn render(template: &str, workspace: &str, args: &Map<String, Value>, missing: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let Some(close) = inner.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &inner[..close];
        if !is_placeholder_key(key) {
            out.push_str("{{");
            rest = inner;
            continue;
        }
        let value = if key == WORKSPACE_KEY {
            Some(workspace.to_string())
        } else {
            args.get(key).and_then(arg_text)
        };
        match value {
            Some(v) => out.push_str(&v),
            None if missing.iter().any(|m| m == key) => {}
            None => missing.push(key.to_string()),
        }
        rest = &inner[close + 2..];
    }
    out.push_str(rest);
    out
}

impl ScriptTool {
    /// 从清单条目与工作区路径创建；条目未指定超时时用 default_timeout_secs
    pub fn new(spec: &ToolSpec, workspace: &Path, default_timeout_secs: u64) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters_schema(),
            program: spec.program.clone(),
            args_template: spec.args.clone(),
            workspace: workspace.to_path_buf(),
            timeout_secs: spec.timeout_secs.unwrap_or(default_timeout_secs),
        }
    }

    /// 按模型传入的 args 生成命令行参数；Err 为缺失的占位符名
    fn command_args(&self, args: &Value) -> Result<Vec<String>, Vec<String>> {
        let empty = Map::new();
        let args = args.as_object().unwrap_or(&empty);
        let workspace = self.workspace.to_string_lossy();
        let mut missing = Vec::new();
        let rendered = self
            .args_template
            .iter()
            .map(|tpl| render(tpl, &workspace, args, &mut missing))
            .collect();
        if missing.is_empty() {
            Ok(rendered)
        } else {
            Err(missing)
        }
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(self.timeout_secs.saturating_add(EXECUTOR_GRACE_SECS))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let argv = self
            .command_args(&args)
            .map_err(|missing| format!("missing argument(s) for {}: {}", self.name, missing.join(", ")))?;
        tracing::info!(tool = %self.name, program = %self.program, argc = argv.len(), "running script tool");

        let child = Command::new(&self.program)
            .args(&argv)
            .current_dir(&self.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("{} spawn failed: {}", self.program, e))?;
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| format!("{} timed out after {}s", self.name, self.timeout_secs))?
            .map_err(|e| format!("{} failed while waiting: {}", self.name, e))?;

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "a signal".to_string(),
            };
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(tool = %self.name, %status, "script tool failed");
            return Err(format!("{} terminated with {}: {}", self.name, status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> ToolSpec {
        ToolSpec {
            name: "t".to_string(),
            description: "test".to_string(),
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            parameters: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn test_command_args_fill_placeholders() {
        let tool = ScriptTool::new(
            &spec(
                "echo",
                &["{{workspace}}/out", "--city={{city}}", "{{n}}", "{{ not a key }}", "{{open"],
            ),
            Path::new("/data"),
            10,
        );
        let args = tool
            .command_args(&serde_json::json!({"city": "Paris", "n": 3}))
            .unwrap();
        assert_eq!(args, vec!["/data/out", "--city=Paris", "3", "{{ not a key }}", "{{open"]);
    }

    #[test]
    fn test_unfilled_placeholders_are_listed_once() {
        let tool = ScriptTool::new(
            &spec("echo", &["{{city}}", "{{city}}-{{n}}", "{{unit}}"]),
            Path::new("/data"),
            10,
        );
        let missing = tool
            .command_args(&serde_json::json!({"n": null, "unit": "C"}))
            .unwrap_err();
        assert_eq!(missing, vec!["city", "n"]);
    }

    #[tokio::test]
    async fn test_missing_argument_is_not_executed() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ScriptTool::new(
            &spec("definitely-not-a-program-xyz", &["--city={{city}}"]),
            dir.path(),
            10,
        );
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert_eq!(err, "missing argument(s) for t: city");
    }

    #[test]
    fn test_executor_timeout_covers_script_timeout() {
        let mut s = spec("echo", &[]);
        s.timeout_secs = Some(60);
        let tool = ScriptTool::new(&s, Path::new("/data"), 10);
        assert_eq!(tool.timeout_secs(), Some(65));
        let tool = ScriptTool::new(&spec("echo", &[]), Path::new("/data"), 10);
        assert_eq!(tool.timeout_secs(), Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_runs_program() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ScriptTool::new(&spec("echo", &["hello {{who}}"]), dir.path(), 10);
        let out = tool
            .execute(serde_json::json!({"who": "sprout"}))
            .await
            .unwrap();
        assert_eq!(out, "hello sprout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ScriptTool::new(&spec("false", &[]), dir.path(), 10);
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.starts_with("t terminated with exit code 1"));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ScriptTool::new(&spec("definitely-not-a-program-xyz", &[]), dir.path(), 10);
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("spawn failed"));
    }
}
