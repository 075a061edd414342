//! Core data models for branchwatch.
//!
//! This crate provides the data types persisted per workstream ("branch"):
//! agent sessions with their extracted checklists, and the status snapshot
//! describing server, database, build and test health.

pub mod session;
pub mod status;

// Re-export main types
pub use session::{progress_for, AgentSession, AgentStatus, AgentTodo, SessionFile};
pub use status::{DatabaseHealth, DatabaseState, ServerHealth, ServerState, StatusSnapshot};
