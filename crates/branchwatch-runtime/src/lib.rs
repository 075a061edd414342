//! Dev server and database health monitoring.
//!
//! - `ServerHealthMonitor` - runs the dev server, classifies its output and
//!   probes it and the database, persisting a per-branch status snapshot
//! - `CommandRunner` - spawns a shell command and streams its output lines
//! - `HttpProbe` / `TcpProbe` - network probes with `reqwest` and `tokio`
//!   implementations
//! - `SnapshotCache` - caller-owned TTL cache for snapshot reads
//!
//! # Example
//!
//! ```no_run
//! use branchwatch_runtime::{MonitorConfig, ServerHealthMonitor};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::default()
//!         .with_database_connection_string("postgresql://dev@localhost:5432/app");
//!     let monitor = ServerHealthMonitor::new("main", "/tmp/branchwatch/branches/main", config)?;
//!
//!     let mut events = monitor.subscribe();
//!     monitor.start_configured(Path::new("/path/to/worktree"));
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("server: {:?}", event.snapshot().server.state);
//!         monitor.check_server_health();
//!         monitor.check_database_connection();
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod monitor;
pub mod probe;
pub mod process;

pub use cache::SnapshotCache;
pub use config::MonitorConfig;
pub use error::{MonitorError, ProbeError, Result};
pub use event::StatusEvent;
pub use monitor::{ServerHealthMonitor, STATUS_FILE};
pub use probe::{HttpProbe, ReqwestProbe, TcpProbe, TokioTcpProbe};
pub use process::{terminate, CommandRunner, RunningCommand};
