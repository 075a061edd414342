//! Session store and output ingestion for one branch.

use std::io;
use std::path::{Path, PathBuf};

use branchwatch_core::{BranchDirs, TodoParser};
use branchwatch_models::{progress_for, AgentSession, AgentStatus, AgentTodo, SessionFile};
use branchwatch_persistence::{CorruptionPolicy, JsonStateFile};
use chrono::Utc;
use tracing::debug;

/// File name of the session list inside a branch directory.
pub const SESSIONS_FILE: &str = "agent-sessions.json";

/// Partial update applied by [`AgentCoordinator::update_session`].
///
/// `None` fields are left untouched. `todo_id` is doubly optional so a link
/// can be cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub status: Option<AgentStatus>,
    pub todo_id: Option<Option<i64>>,
    pub current_files: Option<Vec<String>>,
    pub todo_list: Option<Vec<AgentTodo>>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_todo_id(mut self, todo_id: i64) -> Self {
        self.todo_id = Some(Some(todo_id));
        self
    }

    /// Unlinks the session from its todo item.
    pub fn clear_todo_id(mut self) -> Self {
        self.todo_id = Some(None);
        self
    }

    pub fn with_current_files(mut self, files: Vec<String>) -> Self {
        self.current_files = Some(files);
        self
    }

    pub fn with_todo_list(mut self, todos: Vec<AgentTodo>) -> Self {
        self.todo_list = Some(todos);
        self
    }

    fn apply(self, session: &mut AgentSession) {
        if let Some(title) = self.title {
            session.title = title;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(todo_id) = self.todo_id {
            session.todo_id = todo_id;
        }
        if let Some(files) = self.current_files {
            session.current_files = files;
        }
        if let Some(todos) = self.todo_list {
            session.set_todos(todos);
        }
    }
}

/// Tracks agent sessions for one branch.
///
/// Sessions are stored in `<branch_dir>/agent-sessions.json`:
/// ```text
/// {
///   "branch": "feature/login",
///   "sessions": [ { "id": "...", "todoList": [...], ... } ],
///   "lastUpdated": "2025-11-14T12:00:00Z"
/// }
/// ```
///
/// A corrupted file is moved to `agent-sessions.json.corrupted` and the
/// branch starts over with no sessions. Write failures are logged and
/// dropped; mutating calls still report the in-memory outcome.
#[derive(Debug)]
pub struct AgentCoordinator {
    branch: String,
    store: JsonStateFile<SessionFile>,
    parser: TodoParser,
}

impl AgentCoordinator {
    /// Creates a coordinator for `branch` whose files live in `branch_dir`.
    pub fn new(branch: impl Into<String>, branch_dir: impl AsRef<Path>) -> Self {
        let path = branch_dir.as_ref().join(SESSIONS_FILE);
        Self {
            branch: branch.into(),
            store: JsonStateFile::new(path).with_policy(CorruptionPolicy::Quarantine),
            parser: TodoParser::new(),
        }
    }

    /// Creates a coordinator in the branch directory resolved by `dirs`.
    ///
    /// # Errors
    /// Returns an error if the branch directory cannot be created.
    pub fn for_branch(dirs: &BranchDirs, branch: &str) -> io::Result<Self> {
        let dir = dirs.resolve(branch)?;
        Ok(Self::new(branch, dir))
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Path of the session file.
    pub fn state_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    /// Returns all sessions, oldest first.
    pub fn list_sessions(&self) -> Vec<AgentSession> {
        let mut sessions = self.store.load_or_default().sessions;
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn get_session(&self, id: &str) -> Option<AgentSession> {
        self.store
            .load_or_default()
            .sessions
            .into_iter()
            .find(|s| s.id == id)
    }

    /// Inserts `session`, or replaces the stored session with the same id.
    pub fn upsert_session(&self, mut session: AgentSession) {
        session.refresh_progress();
        self.modify(|sessions| {
            match sessions.iter_mut().find(|s| s.id == session.id) {
                Some(existing) => *existing = session,
                None => sessions.push(session),
            }
            Some(())
        });
    }

    /// Applies `update` to the session with `id`.
    ///
    /// Returns `false` if no such session exists.
    pub fn update_session(&self, id: &str, update: SessionUpdate) -> bool {
        self.modify(|sessions| {
            let session = sessions.iter_mut().find(|s| s.id == id)?;
            update.apply(session);
            session.touch();
            Some(())
        })
        .is_some()
    }

    /// Removes the session with `id` permanently.
    pub fn remove_session(&self, id: &str) -> bool {
        self.modify(|sessions| {
            let before = sessions.len();
            sessions.retain(|s| s.id != id);
            (sessions.len() < before).then_some(())
        })
        .is_some()
    }

    /// Replaces the session's checklist with the one found in `text`.
    ///
    /// `text` is the agent's latest output, not its full history. An output
    /// without a checklist clears the list.
    pub fn ingest_output(&self, id: &str, text: &str) -> bool {
        let todos = self.parser.parse(text);
        debug!(session = id, items = todos.len(), "ingesting agent output");

        self.modify(|sessions| {
            let session = sessions.iter_mut().find(|s| s.id == id)?;
            session.set_todos(todos);
            session.touch();
            Some(())
        })
        .is_some()
    }

    /// Completion percentage of `session`'s checklist.
    pub fn compute_progress(&self, session: &AgentSession) -> Option<u8> {
        progress_for(&session.todo_list)
    }

    /// Read/modify/write of the session list; writes only when `f` returns
    /// `Some`.
    fn modify<R>(&self, f: impl FnOnce(&mut Vec<AgentSession>) -> Option<R>) -> Option<R> {
        self.store.update(|file| {
            let result = f(&mut file.sessions)?;
            file.branch = self.branch.clone();
            file.last_updated = Utc::now();
            Some(result)
        })
    }
}
