//! 任务与笔记能力（始终启用）

use std::sync::Arc;

use serde_json::json;

use crate::capabilities::registry::{CapabilityContext, CapabilityRegistry, ProviderResult};
use crate::capabilities::EnablementPolicy;
use crate::core::{CapabilityError, StoreError};
use crate::memory::StateStore;
use crate::tools::{bool_arg, str_arg, FnTool, Tool};

pub const CAPABILITY_ID: &str = "tasks_notes";
pub const TOOL_NAMES: [&str; 6] = ["add_task", "list_tasks", "complete_task", "add_note", "list_notes", "today_plan"];

/// NotFound 是给模型看的正常结果，其余错误作为工具失败
fn reply(result: Result<String, StoreError>) -> Result<String, String> {
    match result {
        Ok(text) => Ok(text),
        Err(e @ StoreError::NotFound(_)) => Ok(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn string_props(props: &[(&str, &str)], required: &[&str]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = props
        .iter()
        .map(|(name, desc)| (name.to_string(), json!({"type": "string", "description": desc})))
        .collect();
    json!({"type": "object", "properties": properties, "required": required})
}

pub fn build_tools(store: Arc<StateStore>) -> Vec<Arc<dyn Tool>> {
    let s = Arc::clone(&store);
    let add_task = FnTool::new(
        "add_task",
        "Create a task. due_date must be in YYYY-MM-DD format when provided.",
        string_props(
            &[("title", "Task title"), ("due_date", "Due date, YYYY-MM-DD (optional)")],
            &["title"],
        ),
        move |args| reply(s.add_task(str_arg(args, "title"), str_arg(args, "due_date"))),
    );

    let s = Arc::clone(&store);
    let list_tasks = FnTool::new(
        "list_tasks",
        "List tasks from personal memory.",
        json!({
            "type": "object",
            "properties": {
                "include_completed": {"type": "boolean", "description": "Also show completed tasks"}
            },
            "required": []
        }),
        move |args| reply(s.list_tasks(bool_arg(args, "include_completed", false))),
    );

    let s = Arc::clone(&store);
    let complete_task = FnTool::new(
        "complete_task",
        "Mark a task complete using task id.",
        string_props(&[("task_id", "Id shown by list_tasks")], &["task_id"]),
        move |args| {
            // 模型有时把 id 当数字传
            let id = match args.get("task_id") {
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => str_arg(args, "task_id").to_string(),
            };
            reply(s.complete_task(&id))
        },
    );

    let s = Arc::clone(&store);
    let add_note = FnTool::new(
        "add_note",
        "Store a note with title and content.",
        string_props(&[("title", "Note title"), ("content", "Note body")], &["title", "content"]),
        move |args| reply(s.add_note(str_arg(args, "title"), str_arg(args, "content"))),
    );

    let s = Arc::clone(&store);
    let list_notes = FnTool::new(
        "list_notes",
        "List all saved notes.",
        json!({"type": "object", "properties": {}, "required": []}),
        move |_| reply(s.list_notes()),
    );

    let s = store;
    let today_plan = FnTool::new(
        "today_plan",
        "Show pending tasks due today.",
        json!({"type": "object", "properties": {}, "required": []}),
        move |_| reply(s.today_plan()),
    );

    vec![
        Arc::new(add_task),
        Arc::new(list_tasks),
        Arc::new(complete_task),
        Arc::new(add_note),
        Arc::new(list_notes),
        Arc::new(today_plan),
    ]
}

pub async fn register(registry: &CapabilityRegistry) -> Result<(), CapabilityError> {
    registry
        .register(
            CAPABILITY_ID,
            &TOOL_NAMES,
            Arc::new(|ctx: &CapabilityContext| -> ProviderResult { Ok(build_tools(Arc::clone(&ctx.store))) }),
            EnablementPolicy::Always,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tools_drive_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path().join("state.json")).unwrap());
        let tools = build_tools(Arc::clone(&store));
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, TOOL_NAMES);

        let out = tools[0]
            .execute(json!({"title": "Buy milk", "due_date": "2030-01-01"}))
            .await
            .unwrap();
        assert_eq!(out, "Task created with id=1.");

        let out = tools[2].execute(json!({"task_id": 1})).await.unwrap();
        assert_eq!(out, "Task 1 marked complete.");

        let out = tools[2].execute(json!({"task_id": "42"})).await.unwrap();
        assert_eq!(out, "Task 42 not found.");

        let out = tools[1].execute(json!({"include_completed": true})).await.unwrap();
        assert_eq!(out, "[1] (done) Buy milk | due: 2030-01-01");
    }
}
