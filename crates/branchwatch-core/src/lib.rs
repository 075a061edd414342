//! branchwatch core - stateless parsing and shared paths.
//!
//! - **todo_parser**: extract checklist items from freeform agent output
//! - **log_classifier**: classify dev-server log lines as "ready" or "error"
//! - **config**: state directory and per-branch directory resolution
//! - **logging**: `tracing` subscriber bootstrap for host binaries

pub mod config;
pub mod log_classifier;
pub mod logging;
pub mod todo_parser;

pub use config::{branch_dir, sanitize_branch_name, state_dir, BranchDirs};
pub use log_classifier::{LogClassifier, ServerAddress};
pub use logging::init_logging;
pub use todo_parser::{parse_todo_list, TodoParser};
