//! Status snapshot types.
//!
//! The snapshot aggregates server and database health for one branch, plus
//! opaque build and test summaries written by other tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health state of the dev server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// No server process.
    #[default]
    Stopped,
    /// Process spawned, not ready yet.
    Starting,
    /// Server reported ready or answered a probe.
    Healthy,
    /// Server answered a probe with a non-success status.
    Unhealthy,
    /// Server failed.
    Error,
}

/// Health state of the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseState {
    /// Not checked yet.
    #[default]
    Stopped,
    /// Last connect attempt succeeded.
    Connected,
    /// Last connect attempt failed.
    Error,
}

/// Server health as persisted in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerHealth {
    pub state: ServerState,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub error_message: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<f64>,
}

impl ServerHealth {
    /// Creates a server health record in the given state.
    pub fn new(state: ServerState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Stamps `last_check` with the current time.
    pub fn touch(&mut self) {
        self.last_check = Some(Utc::now());
    }

    pub fn is_healthy(&self) -> bool {
        self.state == ServerState::Healthy
    }
}

/// Database health as persisted in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseHealth {
    pub state: DatabaseState,
    pub connection_string: Option<String>,
    pub error_message: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
}

impl DatabaseHealth {
    /// Creates a database health record in the given state.
    pub fn new(state: DatabaseState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Stamps `last_check` with the current time.
    pub fn touch(&mut self) {
        self.last_check = Some(Utc::now());
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Combined health picture for one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub server: ServerHealth,
    #[serde(default)]
    pub database: DatabaseHealth,
    /// Build summary, passed through unmodified.
    #[serde(default = "empty_object")]
    pub build: Value,
    /// Test summary, passed through unmodified.
    #[serde(default = "empty_object")]
    pub tests: Value,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            server: ServerHealth::default(),
            database: DatabaseHealth::default(),
            build: empty_object(),
            tests: empty_object(),
        }
    }
}
