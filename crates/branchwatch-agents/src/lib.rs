//! Agent session tracking for one branch.
//!
//! [`AgentCoordinator`] owns `agent-sessions.json` in a branch directory and
//! keeps each session's checklist and progress in sync with agent output.
//!
//! # Example
//!
//! ```no_run
//! use branchwatch_agents::AgentCoordinator;
//! use branchwatch_models::AgentSession;
//!
//! let coordinator = AgentCoordinator::new("main", "/tmp/branchwatch/branches/main");
//! coordinator.upsert_session(AgentSession::new("s1", "Add login form"));
//! coordinator.ingest_output("s1", "## TODO\n- [x] Scaffold form\n- [ ] Wire submit");
//!
//! let session = coordinator.get_session("s1").unwrap();
//! assert_eq!(session.progress_percent, Some(50));
//! ```

pub mod coordinator;

pub use coordinator::{AgentCoordinator, SessionUpdate, SESSIONS_FILE};
