//! Status events.

use branchwatch_models::StatusSnapshot;

/// Events emitted by a monitor.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// The snapshot file was rewritten.
    SnapshotChanged {
        /// Branch the monitor belongs to.
        branch: String,
        /// Snapshot as written.
        snapshot: StatusSnapshot,
    },
}

impl StatusEvent {
    /// Returns the branch associated with this event.
    pub fn branch(&self) -> &str {
        match self {
            StatusEvent::SnapshotChanged { branch, .. } => branch.as_str(),
        }
    }

    /// Returns the snapshot carried by this event.
    pub fn snapshot(&self) -> &StatusSnapshot {
        match self {
            StatusEvent::SnapshotChanged { snapshot, .. } => snapshot,
        }
    }
}
