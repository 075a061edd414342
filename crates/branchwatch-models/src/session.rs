//! Agent session types.
//!
//! An agent session is one unit of delegated work tracked for a branch,
//! together with the checklist extracted from the agent's latest output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Session exists but the agent has not started.
    #[default]
    Idle,
    /// Agent is actively working.
    Working,
    /// Agent is waiting for input.
    Waiting,
    /// Agent finished its work.
    Completed,
    /// Agent hit an error.
    Error,
}

/// One checklist line extracted from agent output.
///
/// A todo is never both `completed` and `blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTodo {
    /// Item text, trimmed.
    pub text: String,
    /// Whether the item is done.
    #[serde(default)]
    pub completed: bool,
    /// Whether the item is blocked.
    #[serde(default)]
    pub blocked: bool,
}

impl AgentTodo {
    /// Creates a pending todo.
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            blocked: false,
        }
    }

    /// Creates a completed todo.
    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: true,
            blocked: false,
        }
    }

    /// Creates a blocked todo.
    pub fn blocked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            blocked: true,
        }
    }
}

/// Completion percentage for a checklist.
///
/// Returns `None` for an empty list, otherwise `floor(100 * completed / total)`.
pub fn progress_for(todos: &[AgentTodo]) -> Option<u8> {
    if todos.is_empty() {
        return None;
    }
    let total = todos.len();
    let completed = todos.iter().filter(|t| t.completed).count();
    // completed <= total, so the quotient is at most 100
    Some((completed * 100 / total) as u8)
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A tracked unit of delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    /// Opaque, stable identifier.
    pub id: String,

    /// Link to an external checklist entry.
    #[serde(default)]
    pub todo_id: Option<i64>,

    /// Human-readable title.
    #[serde(default)]
    pub title: String,

    /// Current status.
    #[serde(default)]
    pub status: AgentStatus,

    /// Files the agent is touching, most relevant first.
    #[serde(default)]
    pub current_files: Vec<String>,

    /// Checklist extracted from the latest output.
    #[serde(default)]
    pub todo_list: Vec<AgentTodo>,

    /// Completion percentage derived from `todo_list`.
    #[serde(default)]
    pub progress_percent: Option<u8>,

    /// When the session last changed.
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,

    /// When the session was registered.
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

impl AgentSession {
    /// Creates a new idle session.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            todo_id: None,
            title: title.into(),
            status: AgentStatus::Idle,
            current_files: Vec::new(),
            todo_list: Vec::new(),
            progress_percent: None,
            last_active: None,
            created_at: Utc::now(),
        }
    }

    /// Replaces the checklist and recomputes progress.
    pub fn set_todos(&mut self, todos: Vec<AgentTodo>) {
        self.todo_list = todos;
        self.refresh_progress();
    }

    /// Recomputes `progress_percent` from `todo_list`.
    pub fn refresh_progress(&mut self) {
        self.progress_percent = progress_for(&self.todo_list);
    }

    /// Marks the session as active now.
    pub fn touch(&mut self) {
        self.last_active = Some(Utc::now());
    }
}

/// On-disk envelope for a branch's session list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    /// Branch the sessions belong to.
    #[serde(default)]
    pub branch: String,

    /// All tracked sessions.
    #[serde(default)]
    pub sessions: Vec<AgentSession>,

    /// When the file was last written.
    #[serde(default = "now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for SessionFile {
    fn default() -> Self {
        Self::new(String::new(), Vec::new())
    }
}

impl SessionFile {
    /// Creates an envelope stamped with the current time.
    pub fn new(branch: impl Into<String>, sessions: Vec<AgentSession>) -> Self {
        Self {
            branch: branch.into(),
            sessions,
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_default() {
        assert_eq!(AgentStatus::default(), AgentStatus::Idle);
    }

    #[test]
    fn test_agent_status_serialization() {
        let json = serde_json::to_string(&AgentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");

        let status: AgentStatus = serde_json::from_str("\"waiting\"").unwrap();
        assert_eq!(status, AgentStatus::Waiting);
    }

    #[test]
    fn test_progress_for_empty() {
        assert_eq!(progress_for(&[]), None);
    }

    #[test]
    fn test_progress_for_truncates() {
        let todos = vec![
            AgentTodo::done("First task"),
            AgentTodo::pending("Second task"),
            AgentTodo::pending("Third task"),
        ];
        assert_eq!(progress_for(&todos), Some(33));

        let todos = vec![
            AgentTodo::done("First task"),
            AgentTodo::done("Second task"),
            AgentTodo::pending("Third task"),
        ];
        assert_eq!(progress_for(&todos), Some(66));
    }

    #[test]
    fn test_progress_blocked_counts_as_incomplete() {
        let todos = vec![AgentTodo::done("Ship it"), AgentTodo::blocked("Wait on review")];
        assert_eq!(progress_for(&todos), Some(50));
    }

    #[test]
    fn test_set_todos_recomputes_progress() {
        let mut session = AgentSession::new("s1", "Refactor auth");
        assert_eq!(session.progress_percent, None);

        session.set_todos(vec![
            AgentTodo::done("one"),
            AgentTodo::pending("two"),
            AgentTodo::pending("three"),
            AgentTodo::pending("four"),
        ]);
        assert_eq!(session.progress_percent, Some(25));

        session.set_todos(Vec::new());
        assert_eq!(session.progress_percent, None);
    }

    #[test]
    fn test_session_json_keys() {
        let session = AgentSession::new("s1", "Write tests");
        let value = serde_json::to_value(&session).unwrap();

        assert_eq!(value["id"], "s1");
        assert_eq!(value["status"], "idle");
        assert!(value["todoId"].is_null());
        assert!(value["progressPercent"].is_null());
        assert!(value["lastActive"].is_null());
        assert!(value["currentFiles"].is_array());
        assert!(value["todoList"].is_array());
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn test_session_deserialize_missing_optionals() {
        let json = r#"{
            "id": "abc",
            "title": "Minimal",
            "status": "working",
            "createdAt": "2025-11-14T12:00:00Z"
        }"#;
        let session: AgentSession = serde_json::from_str(json).unwrap();

        assert_eq!(session.id, "abc");
        assert_eq!(session.status, AgentStatus::Working);
        assert_eq!(session.todo_id, None);
        assert!(session.todo_list.is_empty());
        assert_eq!(session.progress_percent, None);
        assert_eq!(session.last_active, None);
    }

    #[test]
    fn test_session_file_keys() {
        let file = SessionFile::new("feature/x", vec![AgentSession::new("s1", "t")]);
        let value = serde_json::to_value(&file).unwrap();

        assert_eq!(value["branch"], "feature/x");
        assert_eq!(value["sessions"].as_array().unwrap().len(), 1);
        assert!(value["lastUpdated"].is_string());
    }
}
