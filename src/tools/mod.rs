//! 工具层：Tool trait、工具集、执行器、脚本工具与 tool call schema

pub mod executor;
pub mod registry;
pub mod schema;
pub mod script;

pub use executor::{ToolExecutor, ToolOutcome};
pub use registry::{bool_arg, str_arg, FnTool, Tool, ToolSet};
pub use schema::tool_call_schema_json;
pub use script::ScriptTool;
