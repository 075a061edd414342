//! Persistence layer for branchwatch.
//!
//! This crate provides crash-safe persistence for per-branch state files
//! using atomic file operations (write to a locked temp file, fsync, then
//! rename). Readers never lock: a missing or unparsable file simply means
//! "no data yet".
//!
//! # Example
//!
//! ```no_run
//! use branchwatch_persistence::JsonStateFile;
//! use branchwatch_models::StatusSnapshot;
//!
//! let file: JsonStateFile<StatusSnapshot> = JsonStateFile::new("/tmp/branch/status-bar.json");
//!
//! file.update(|snapshot| {
//!     snapshot.server.touch();
//!     Some(())
//! });
//!
//! let snapshot = file.load_or_default();
//! ```

pub mod atomic;
pub mod error;
pub mod state_file;

pub use error::{PersistenceError, Result};
pub use state_file::{CorruptionPolicy, JsonStateFile, CORRUPTED_SUFFIX};
