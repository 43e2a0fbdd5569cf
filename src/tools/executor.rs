//! 工具执行器
//!
//! 持有当前 ToolSet 与默认的单次调用超时（工具可通过 Tool::timeout_secs 自带超时）；dispatch 对每次调用施加超时，未知工具 / 失败 / 超时
//! 统一转成 "Error: ..." 文本交回模型，保证对话循环不中断；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::ToolSet;

/// 单次工具调用的结果
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    pub ok: bool,
    pub output: String,
}

/// 工具执行器：绑定一份工具集
pub struct ToolExecutor {
    tools: ToolSet,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(tools: ToolSet, timeout_secs: u64) -> Self {
        Self {
            tools,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    /// 执行指定工具；未知工具返回 UnknownTool，超时返回 ToolTimeout，工具 Err 转为 ToolExecutionFailed
    pub async fn execute(&self, call: &ToolCall) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(&call.tool)
            .ok_or_else(|| AgentError::UnknownTool(call.tool.clone()))?;

        let limit = tool.timeout_secs().map(Duration::from_secs).unwrap_or(self.timeout);
        let start = Instant::now();
        let result = timeout(limit, tool.execute(call.args.clone())).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(call.tool.clone())),
        }
    }

    /// 执行并把任何失败折叠成文字结果
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        match self.execute(call).await {
            Ok(output) => ToolOutcome {
                tool: call.tool.clone(),
                ok: true,
                output,
            },
            Err(e) => {
                let output = match &e {
                    AgentError::UnknownTool(name) => format!(
                        "Error: unknown tool '{}'. Available tools: {}",
                        name,
                        self.tool_names().join(", ")
                    ),
                    AgentError::ToolExecutionFailed(msg) => format!("Error: {}", msg),
                    other => format!("Error: {}", other),
                };
                ToolOutcome {
                    tool: call.tool.clone(),
                    ok: false,
                    output,
                }
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::tools::{FnTool, Tool};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    /// 自带更长超时的慢工具
    struct PatientTool;

    #[async_trait]
    impl Tool for PatientTool {
        fn name(&self) -> &str {
            "patient"
        }

        fn description(&self) -> &str {
            "sleeps past the default timeout"
        }

        fn timeout_secs(&self) -> Option<u64> {
            Some(5)
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok("finished".to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut set = ToolSet::new();
        set.insert(Arc::new(FnTool::new(
            "fail",
            "always fails",
            serde_json::json!({}),
            |_| Err("boom".to_string()),
        )));
        set.insert(Arc::new(SlowTool));
        set.insert(Arc::new(PatientTool));
        ToolExecutor::new(set, 1)
    }

    #[tokio::test]
    async fn test_failures_become_text() {
        let exec = executor();
        let out = exec.dispatch(&ToolCall::new("fail", serde_json::json!({}))).await;
        assert!(!out.ok);
        assert_eq!(out.output, "Error: boom");

        let out = exec.dispatch(&ToolCall::new("nope", serde_json::json!({}))).await;
        assert!(!out.ok);
        assert!(out.output.contains("unknown tool 'nope'"));
        assert!(out.output.contains("fail, slow, patient"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let exec = executor();
        let err = exec
            .execute(&ToolCall::new("slow", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref t) if t == "slow"));
    }

    #[tokio::test]
    async fn test_tool_timeout_overrides_default() {
        let exec = executor();
        let out = exec.dispatch(&ToolCall::new("patient", serde_json::json!({}))).await;
        assert!(out.ok, "{}", out.output);
        assert_eq!(out.output, "finished");
    }
}
