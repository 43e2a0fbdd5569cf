//! 认知层：Planner、ReAct 主循环、过程事件与内置 prompt

pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompts;

pub use events::ReactEvent;
pub use loop_::{fallback_answer, react_loop, ReactResult, ReactSession, MAX_REACT_STEPS};
pub use planner::{compose_system_prompt, parse_llm_output, Planner, PlannerOutput};
pub use prompts::{PromptSet, CONTROLLER_PROMPT, SYSTEM_PROMPT};
