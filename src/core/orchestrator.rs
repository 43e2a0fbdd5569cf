//! 对话编排器：一个会话（session）的主控
//!
//! 每轮从当前绑定（Planner + ToolExecutor）跑 ReAct 循环，成功后一次性提交本轮消息。
//! 若本轮有一次成功的 add_capability，就在返回前重建绑定：重新枚举注册表，
//! 复用同一个 LLM 句柄，对话状态保持不变，新工具从下一轮起可用。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::capabilities::{
    CapabilityContext, CapabilityRegistry, CapabilityWarning, EnablementDecision, ADD_CAPABILITY_TOOL,
};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::ConversationState;
use crate::react::{compose_system_prompt, react_loop, Planner, PromptSet, ReactEvent, ReactSession};
use crate::tools::{ToolExecutor, ToolOutcome};

/// 当前工具绑定：Planner（含拼好工具的 system prompt）+ 执行器
pub struct AgentBinding {
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub decisions: Vec<EnablementDecision>,
    pub warnings: Vec<CapabilityWarning>,
    /// add_capability 可用时使用控制器 prompt
    pub controller_mode: bool,
}

impl AgentBinding {
    /// 按注册表当前内容构建绑定
    pub async fn build(
        registry: &CapabilityRegistry,
        context: &CapabilityContext,
        llm: Arc<dyn LlmClient>,
        prompts: &PromptSet,
    ) -> Self {
        let enumerated = registry.enumerate_tools(context, true).await;
        let controller_mode = enumerated.tools.contains(ADD_CAPABILITY_TOOL);
        let system = compose_system_prompt(prompts.select(controller_mode), &enumerated.tools);
        tracing::info!(
            tools = ?enumerated.tools.tool_names(),
            controller_mode,
            "agent binding built"
        );
        Self {
            planner: Planner::new(llm, system),
            executor: ToolExecutor::new(enumerated.tools, context.config.tools.tool_timeout_secs),
            decisions: enumerated.decisions,
            warnings: enumerated.warnings,
            controller_mode,
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }
}

/// 单轮结果
#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    /// 本轮结束时是否重建了绑定
    pub rebuilt: bool,
    pub tool_outcomes: Vec<ToolOutcome>,
}

/// 对话编排器
pub struct ConversationOrchestrator {
    session_id: String,
    registry: Arc<CapabilityRegistry>,
    context: CapabilityContext,
    llm: Arc<dyn LlmClient>,
    prompts: PromptSet,
    max_steps: usize,
    binding: AgentBinding,
    state: ConversationState,
    cancel_token: CancellationToken,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl ConversationOrchestrator {
    pub async fn new(
        registry: Arc<CapabilityRegistry>,
        context: CapabilityContext,
        llm: Arc<dyn LlmClient>,
        prompts: PromptSet,
    ) -> Self {
        let binding = AgentBinding::build(&registry, &context, Arc::clone(&llm), &prompts).await;
        let max_steps = context.config.tools.max_steps;
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session = %session_id, "session started");
        Self {
            session_id,
            registry,
            context,
            llm,
            prompts,
            max_steps,
            binding,
            state: ConversationState::new(),
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// 以已有对话开始（如 HTTP 请求带来的 chat_history）
    pub fn with_history(mut self, state: ConversationState) -> Self {
        self.state = state;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn binding(&self) -> &AgentBinding {
        &self.binding
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.binding.tool_names()
    }

    /// 取消当前轮次（在下一步模型调用前生效）
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 跑一轮对话；失败时对话状态不变
    pub async fn run_turn(&mut self, user_input: &str) -> Result<TurnOutcome, AgentError> {
        let result = {
            let mut session = ReactSession::new(
                &self.binding.planner,
                &self.binding.executor,
                self.cancel_token.clone(),
            )
            .with_max_steps(self.max_steps);
            if let Some(tx) = &self.event_tx {
                session = session.with_event_tx(tx);
            }
            react_loop(&session, self.state.messages(), user_input).await
        };

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, AgentError::Cancelled) {
                    self.cancel_token = CancellationToken::new();
                }
                tracing::warn!(session = %self.session_id, error = %e, "turn failed, state unchanged");
                return Err(e);
            }
        };

        self.state.extend(result.turn);

        let capability_added = result
            .outcomes
            .iter()
            .any(|o| o.ok && o.tool == ADD_CAPABILITY_TOOL);
        if capability_added {
            self.rebuild().await;
        }

        Ok(TurnOutcome {
            response: result.response,
            rebuilt: capability_added,
            tool_outcomes: result.outcomes,
        })
    }

    /// 重新枚举注册表并替换绑定（同一 LLM 句柄）
    pub async fn rebuild(&mut self) {
        self.binding =
            AgentBinding::build(&self.registry, &self.context, Arc::clone(&self.llm), &self.prompts).await;
        tracing::info!(session = %self.session_id, "binding rebuilt after capability addition");
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ReactEvent::Rebuild {
                tools: self.binding.tool_names(),
            });
        }
    }
}
