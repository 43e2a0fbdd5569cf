//! ReAct 主循环
//!
//! Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出最终回复或达到步数上限。
//! 本轮消息只在暂存区累积，调用方在成功后一次性提交；失败时对话状态保持原样。
//! 可选 event_tx：向 CLI / Web 推送 ToolCall / Observation / MessageDone。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::memory::{Message, Role};
use crate::react::planner::{parse_llm_output, Planner, PlannerOutput};
use crate::react::ReactEvent;
use crate::tools::{ToolExecutor, ToolOutcome};

/// 单轮内最大模型调用次数，防止死循环
pub const MAX_REACT_STEPS: usize = 20;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 空回复的最终兜底
pub const NO_RESPONSE: &str = "No response.";

/// 单轮结果：最终回复、本轮新增消息（含用户消息）与全部工具调用结果
#[derive(Debug)]
pub struct ReactResult {
    pub response: String,
    pub turn: Vec<Message>,
    pub outcomes: Vec<ToolOutcome>,
}

/// ReAct 会话配置
pub struct ReactSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
    pub max_steps: usize,
}

impl<'a> ReactSession<'a> {
    pub fn new(planner: &'a Planner, executor: &'a ToolExecutor, cancel_token: CancellationToken) -> Self {
        Self {
            planner,
            executor,
            cancel_token,
            event_tx: None,
            max_steps: MAX_REACT_STEPS,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    fn send(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 空回复兜底：本轮最后一条非空 Assistant 文本 -> 本轮最后一条工具结果 -> "No response."
pub fn fallback_answer(turn: &[Message]) -> String {
    let last_text = turn
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
        .map(|m| m.content.trim().to_string());
    let last_result = || {
        turn.iter()
            .rev()
            .find(|m| m.role == Role::ToolResult && !m.content.trim().is_empty())
            .map(|m| m.content.trim().to_string())
    };
    last_text
        .or_else(last_result)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

/// 执行一轮：history 为已提交的对话，user_input 为本轮输入
pub async fn react_loop(
    session: &ReactSession<'_>,
    history: &[Message],
    user_input: &str,
) -> Result<ReactResult, AgentError> {
    let mut turn = vec![Message::user(user_input.to_string())];
    let mut outcomes = Vec::new();
    let (init_prompt, init_completion, _) = session.planner.token_usage();

    for step in 0..session.max_steps {
        session.send(ReactEvent::StepUpdate {
            step,
            max_steps: session.max_steps,
        });

        if session.cancel_token.is_cancelled() {
            session.send(ReactEvent::Error {
                text: "Cancelled by user".to_string(),
            });
            return Err(AgentError::Cancelled);
        }

        let mut messages = Vec::with_capacity(history.len() + turn.len());
        messages.extend_from_slice(history);
        messages.extend_from_slice(&turn);

        let output = session.planner.plan(&messages).await.map_err(|e| {
            session.send(ReactEvent::Error { text: e.to_string() });
            e
        })?;

        match parse_llm_output(&output).map_err(|e| {
            session.send(ReactEvent::Error { text: e.to_string() });
            e
        })? {
            PlannerOutput::Response(text) => {
                let response = if text.trim().is_empty() {
                    fallback_answer(&turn)
                } else {
                    text
                };
                turn.push(Message::assistant(response.clone()));
                session.send(ReactEvent::MessageDone { text: response.clone() });

                let (prompt, completion, _) = session.planner.token_usage();
                tracing::debug!(
                    steps = step + 1,
                    tool_calls = outcomes.len(),
                    prompt_tokens = prompt.saturating_sub(init_prompt),
                    completion_tokens = completion.saturating_sub(init_completion),
                    "turn finished"
                );
                return Ok(ReactResult {
                    response,
                    turn,
                    outcomes,
                });
            }
            PlannerOutput::ToolCalls { text, calls } => {
                turn.push(Message::assistant_with_calls(text, calls.clone()));
                for call in calls {
                    session.send(ReactEvent::ToolCall {
                        tool: call.tool.clone(),
                        args: call.args.clone(),
                    });
                    let outcome = session.executor.dispatch(&call).await;
                    if outcome.ok {
                        session.send(ReactEvent::Observation {
                            tool: outcome.tool.clone(),
                            preview: preview(&outcome.output),
                        });
                    } else {
                        session.send(ReactEvent::ToolFailure {
                            tool: outcome.tool.clone(),
                            reason: outcome.output.clone(),
                        });
                    }
                    turn.push(Message::tool_result(outcome.tool.clone(), outcome.output.clone()));
                    outcomes.push(outcome);
                }
            }
        }
    }

    // 步数用尽：确定性的兜底回复
    let response = format!(
        "Stopped after {} steps without a final answer. Last result: {}",
        session.max_steps,
        fallback_answer(&turn)
    );
    tracing::warn!(max_steps = session.max_steps, "step limit reached");
    turn.push(Message::assistant(response.clone()));
    session.send(ReactEvent::MessageDone { text: response.clone() });
    Ok(ReactResult {
        response,
        turn,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::ToolCall;
    use crate::tools::{FnTool, ToolSet};

    fn executor() -> ToolExecutor {
        let mut set = ToolSet::new();
        set.insert(Arc::new(FnTool::new(
            "ping",
            "replies pong",
            serde_json::json!({}),
            |_| Ok("pong".to_string()),
        )));
        ToolExecutor::new(set, 5)
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"tool": "ping", "args": {}}"#, "done"]));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ReactSession::new(&planner, &exec, CancellationToken::new()).with_event_tx(&tx);

        let result = react_loop(&session, &[], "hi").await.unwrap();
        assert_eq!(result.response, "done");
        assert_eq!(result.turn.len(), 4);
        assert_eq!(result.turn[2], Message::tool_result("ping", "pong"));
        assert!(result.outcomes[0].ok);

        // 第二次请求能看到工具结果
        let requests = llm.requests().await;
        assert_eq!(requests[1].last().unwrap().content, "pong");
        assert_eq!(requests[1][0].content, "sys");

        let mut saw_call = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, ReactEvent::ToolCall { ref tool, .. } if tool == "ping") {
                saw_call = true;
            }
        }
        assert!(saw_call);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"tool": "nope"}"#, "ok"]));
        let planner = Planner::new(llm, "sys");
        let exec = executor();
        let session = ReactSession::new(&planner, &exec, CancellationToken::new());
        let result = react_loop(&session, &[], "hi").await.unwrap();
        assert!(!result.outcomes[0].ok);
        assert!(result.turn[2].content.starts_with("Error: unknown tool 'nope'"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"tool": "ping"}"#, r#"{"tool": "ping"}"#]));
        let planner = Planner::new(llm, "sys");
        let exec = executor();
        let session = ReactSession::new(&planner, &exec, CancellationToken::new()).with_max_steps(2);
        let result = react_loop(&session, &[], "hi").await.unwrap();
        assert_eq!(result.response, "Stopped after 2 steps without a final answer. Last result: pong");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let llm = Arc::new(ScriptedLlmClient::new(["never"]));
        let planner = Planner::new(llm, "sys");
        let exec = executor();
        let token = CancellationToken::new();
        token.cancel();
        let session = ReactSession::new(&planner, &exec, token);
        assert!(matches!(
            react_loop(&session, &[], "hi").await.unwrap_err(),
            AgentError::Cancelled
        ));
    }

    #[test]
    fn test_fallback_chain() {
        let turn = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![ToolCall::new("ping", serde_json::json!({}))]),
            Message::tool_result("ping", "pong"),
        ];
        assert_eq!(fallback_answer(&turn), "pong");

        let turn = vec![
            Message::user("q"),
            Message::assistant_with_calls("Checking", vec![ToolCall::new("ping", serde_json::json!({}))]),
            Message::tool_result("ping", "pong"),
        ];
        assert_eq!(fallback_answer(&turn), "Checking");

        assert_eq!(fallback_answer(&[Message::user("q")]), NO_RESPONSE);
    }
}
