//! 任务与笔记的持久化存储
//!
//! 单个 JSON 文件 `{"tasks": [...], "notes": [...]}`；文件不存在时创建空列表。
//! 每次操作都是「整体读出 -> 内存修改 -> 整体写回」，没有锁：多个会话并发写入时
//! 可能丢失更新，需要更强保证的调用方应换成带事务或加锁的存储。
//!
//! 任务 id 取创建时的 `任务数 + 1`；如果有人在外部删除了任务，id 可能重复。

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

/// 存储文件的完整内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// 基于 JSON 文件的存储
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// 打开存储；文件不存在时创建（含父目录）
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        if !store.path.exists() {
            if let Some(parent) = store.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            store.save(&AssistantState::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AssistantState, StoreError> {
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, state: &AssistantState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn add_task(&self, title: &str, due_date: &str) -> Result<String, StoreError> {
        let mut state = self.load()?;
        let task_id = (state.tasks.len() + 1).to_string();
        state.tasks.push(Task {
            id: task_id.clone(),
            title: title.trim().to_string(),
            due_date: due_date.trim().to_string(),
            completed: false,
        });
        self.save(&state)?;
        Ok(format!("Task created with id={}.", task_id))
    }

    pub fn list_tasks(&self, include_completed: bool) -> Result<String, StoreError> {
        let state = self.load()?;
        let rows: Vec<String> = state
            .tasks
            .iter()
            .filter(|t| include_completed || !t.completed)
            .map(|t| {
                let status = if t.completed { "done" } else { "todo" };
                let due = if t.due_date.is_empty() { "-" } else { t.due_date.as_str() };
                format!("[{}] ({}) {} | due: {}", t.id, status, t.title, due)
            })
            .collect();
        if rows.is_empty() {
            return Ok("No tasks found.".to_string());
        }
        Ok(rows.join("\n"))
    }

    /// 标记完成；已完成的任务直接返回同样的成功信息，不重复写盘
    pub fn complete_task(&self, task_id: &str) -> Result<String, StoreError> {
        let task_id = task_id.trim();
        let mut state = self.load()?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if !task.completed {
            task.completed = true;
            self.save(&state)?;
        }
        Ok(format!("Task {} marked complete.", task_id))
    }

    pub fn add_note(&self, title: &str, content: &str) -> Result<String, StoreError> {
        let mut state = self.load()?;
        state.notes.push(Note {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
        });
        self.save(&state)?;
        Ok("Note saved.".to_string())
    }

    pub fn list_notes(&self) -> Result<String, StoreError> {
        let state = self.load()?;
        if state.notes.is_empty() {
            return Ok("No notes found.".to_string());
        }
        Ok(state
            .notes
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}. {}: {}", i + 1, n.title, n.content))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// 今日待办（本地日期）
    pub fn today_plan(&self) -> Result<String, StoreError> {
        self.plan_for(chrono::Local::now().date_naive())
    }

    /// 指定日期到期且未完成的任务
    pub fn plan_for(&self, date: NaiveDate) -> Result<String, StoreError> {
        let day = date.format("%Y-%m-%d").to_string();
        let state = self.load()?;
        let due: Vec<&Task> = state
            .tasks
            .iter()
            .filter(|t| !t.completed && t.due_date.trim() == day)
            .collect();
        if due.is_empty() {
            return Ok(format!("No pending tasks due today ({}).", day));
        }
        let mut lines = vec![format!("Tasks due today ({}):", day)];
        lines.extend(due.iter().map(|t| format!("- [{}] {}", t.id, t.title)));
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = StateStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.load().unwrap(), AssistantState::default());
    }

    #[test]
    fn test_save_load_round_trip_keeps_order() {
        let (_dir, store) = temp_store();
        let state = AssistantState {
            tasks: vec![
                Task {
                    id: "1".into(),
                    title: "b".into(),
                    due_date: "".into(),
                    completed: true,
                },
                Task {
                    id: "2".into(),
                    title: "a".into(),
                    due_date: "2025-02-03".into(),
                    completed: false,
                },
            ],
            notes: vec![
                Note {
                    title: "z".into(),
                    content: "last letter".into(),
                },
                Note {
                    title: "a".into(),
                    content: "first letter".into(),
                },
            ],
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_add_and_complete_task() {
        let (_dir, store) = temp_store();
        assert_eq!(
            store.add_task("  Buy milk ", "2025-01-01").unwrap(),
            "Task created with id=1."
        );
        assert_eq!(
            store.list_tasks(false).unwrap(),
            "[1] (todo) Buy milk | due: 2025-01-01"
        );
        assert_eq!(store.complete_task("1").unwrap(), "Task 1 marked complete.");
        assert_eq!(store.list_tasks(false).unwrap(), "No tasks found.");
        assert_eq!(
            store.list_tasks(true).unwrap(),
            "[1] (done) Buy milk | due: 2025-01-01"
        );
    }

    #[test]
    fn test_complete_task_is_idempotent() {
        let (_dir, store) = temp_store();
        store.add_task("Walk", "").unwrap();
        store.complete_task("1").unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(store.complete_task("1").unwrap(), "Task 1 marked complete.");
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_complete_missing_task_leaves_store_untouched() {
        let (_dir, store) = temp_store();
        store.add_task("Walk", "").unwrap();
        let before = store.load().unwrap();
        let err = store.complete_task("42").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref id) if id == "42"));
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn test_notes_keep_insertion_order() {
        let (_dir, store) = temp_store();
        assert_eq!(store.list_notes().unwrap(), "No notes found.");
        store.add_note("Groceries", "eggs").unwrap();
        store.add_note("Ideas", " garden ").unwrap();
        assert_eq!(
            store.list_notes().unwrap(),
            "1. Groceries: eggs\n2. Ideas: garden"
        );
    }

    #[test]
    fn test_plan_for_date() {
        let (_dir, store) = temp_store();
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(
            store.plan_for(day).unwrap(),
            "No pending tasks due today (2025-03-14)."
        );
        store.add_task("Pay rent", "2025-03-14").unwrap();
        store.add_task("Later", "2025-03-15").unwrap();
        store.add_task("Done already", "2025-03-14").unwrap();
        store.complete_task("3").unwrap();
        assert_eq!(
            store.plan_for(day).unwrap(),
            "Tasks due today (2025-03-14):\n- [1] Pay rent"
        );
    }
}
