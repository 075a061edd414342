//! Dev server and database health monitor for one branch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use branchwatch_core::{BranchDirs, LogClassifier};
use branchwatch_models::{
    DatabaseHealth, DatabaseState, ServerHealth, ServerState, StatusSnapshot,
};
use branchwatch_persistence::JsonStateFile;
use regex::Regex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::event::StatusEvent;
use crate::probe::{HttpProbe, ReqwestProbe, TcpProbe, TokioTcpProbe};
use crate::process::{self, CommandRunner};

/// File name of the snapshot inside a branch directory.
pub const STATUS_FILE: &str = "status-bar.json";

/// The server process owned by the monitor.
#[derive(Debug, Clone, Copy)]
struct ServerRun {
    generation: u64,
    pid: Option<u32>,
}

/// Mutable bookkeeping, guarded by one lock.
#[derive(Debug, Default)]
struct MonitorState {
    generation: u64,
    run: Option<ServerRun>,
    started_at: Option<Instant>,
    last_server_probe: Option<Instant>,
    last_db_probe: Option<Instant>,
}

/// Returns true and stamps `last` if `interval` has passed since it.
fn claim_probe_slot(last: &mut Option<Instant>, interval: Duration, now: Instant) -> bool {
    if let Some(previous) = *last {
        if now.saturating_duration_since(previous) < interval {
            return false;
        }
    }
    *last = Some(now);
    true
}

/// Extracts `host` and `port` from `...@host:port...`.
fn parse_db_address(conn: &str) -> Option<(String, u16)> {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    let regex =
        ADDRESS.get_or_init(|| Regex::new(r"@([^:]+):(\d+)").expect("Invalid address pattern"));

    let caps = regex.captures(conn)?;
    let port = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), port))
}

struct Inner {
    branch: String,
    config: MonitorConfig,
    classifier: LogClassifier,
    store: JsonStateFile<StatusSnapshot>,
    state: Mutex<MonitorState>,
    events: broadcast::Sender<StatusEvent>,
    http: Arc<dyn HttpProbe>,
    tcp: Arc<dyn TcpProbe>,
}

/// Tracks dev server and database health for one branch.
///
/// Every change is written to `<branch_dir>/status-bar.json` and published
/// as a [`StatusEvent`]. Server states move as follows:
///
/// ```text
/// stopped ──start──▶ starting ──ready line──▶ healthy ◀──probe──▶ unhealthy
///    ▲                  │                        │
///    └──stop / exit 0───┴───error line, bad exit─┴──▶ error
/// ```
///
/// Background work (the server process and probes) runs on tokio tasks, so
/// [`start`](Self::start) and the `check_*` methods must be called from
/// within a tokio runtime. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct ServerHealthMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHealthMonitor")
            .field("branch", &self.inner.branch)
            .field("status_path", &self.inner.store.path())
            .finish()
    }
}

impl ServerHealthMonitor {
    /// Creates a monitor with the default network probes.
    ///
    /// # Errors
    /// Returns [`MonitorError::InvalidPattern`] if a configured pattern does
    /// not compile.
    pub fn new(
        branch: impl Into<String>,
        branch_dir: impl AsRef<Path>,
        config: MonitorConfig,
    ) -> Result<Self> {
        Self::with_probes(
            branch,
            branch_dir,
            config,
            Arc::new(ReqwestProbe::new()),
            Arc::new(TokioTcpProbe),
        )
    }

    /// Creates a monitor with custom probes.
    pub fn with_probes(
        branch: impl Into<String>,
        branch_dir: impl AsRef<Path>,
        config: MonitorConfig,
        http: Arc<dyn HttpProbe>,
        tcp: Arc<dyn TcpProbe>,
    ) -> Result<Self> {
        let classifier = LogClassifier::from_patterns(
            config.ready_patterns.as_deref(),
            config.error_patterns.as_deref(),
        )?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            inner: Arc::new(Inner {
                branch: branch.into(),
                store: JsonStateFile::new(branch_dir.as_ref().join(STATUS_FILE)),
                config,
                classifier,
                state: Mutex::new(MonitorState::default()),
                events,
                http,
                tcp,
            }),
        })
    }

    /// Creates a monitor in the branch directory resolved by `dirs`.
    pub fn for_branch(dirs: &BranchDirs, branch: &str, config: MonitorConfig) -> Result<Self> {
        let dir = dirs.resolve(branch)?;
        Self::new(branch, dir, config)
    }

    pub fn branch(&self) -> &str {
        &self.inner.branch
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Path of the snapshot file.
    pub fn status_path(&self) -> PathBuf {
        self.inner.store.path().to_path_buf()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe()
    }

    /// Loads the snapshot; missing or unreadable files yield the default.
    pub fn load_status(&self) -> StatusSnapshot {
        self.inner.store.load_or_default()
    }

    /// Loads the snapshot through `cache`.
    pub fn load_status_cached(&self, cache: &mut SnapshotCache) -> StatusSnapshot {
        cache
            .get_or_load(Instant::now(), || self.load_status())
            .clone()
    }

    /// Returns true while a server process started by this monitor is live.
    pub fn is_running(&self) -> bool {
        self.lock_state().run.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- server process ----

    /// Starts the configured server command in `working_dir`.
    pub fn start_configured(&self, working_dir: &Path) -> bool {
        let command = self.inner.config.server_command.clone();
        self.start(&command, working_dir)
    }

    /// Starts `command` in `working_dir`.
    ///
    /// Returns `false` if a server is already running or the command could
    /// not be spawned (the latter is recorded as `error`).
    pub fn start(&self, command: &str, working_dir: &Path) -> bool {
        let generation = {
            let mut state = self.lock_state();
            if state.run.is_some() {
                return false;
            }
            state.generation += 1;
            state.run = Some(ServerRun {
                generation: state.generation,
                pid: None,
            });
            state.generation
        };

        self.update_server(|server| {
            server.state = ServerState::Starting;
            server.error_message = None;
            server.uptime_seconds = None;
        });

        match self.spawn_server(command, working_dir, generation) {
            Ok(()) => {
                info!(branch = %self.inner.branch, command, "server started");
                true
            }
            Err(e) => {
                {
                    let mut state = self.lock_state();
                    if state.run.map(|r| r.generation) == Some(generation) {
                        state.run = None;
                        state.started_at = None;
                    }
                }
                warn!(branch = %self.inner.branch, error = %e, "server failed to start");
                self.update_server(|server| {
                    server.state = ServerState::Error;
                    server.error_message = Some(format!("Failed to start server: {}", e));
                });
                false
            }
        }
    }

    fn spawn_server(&self, command: &str, working_dir: &Path, generation: u64) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let monitor = self.clone();
        let running = CommandRunner::new(command, working_dir)
            .spawn(move |line| monitor.on_output_line(&line))?;

        {
            let mut state = self.lock_state();
            if let Some(run) = state.run.as_mut().filter(|r| r.generation == generation) {
                run.pid = running.pid();
                state.started_at = Some(Instant::now());
            }
        }

        let monitor = self.clone();
        handle.spawn(async move {
            let result = running.wait().await;
            monitor
                .persist(move |monitor| monitor.on_server_exit(generation, result))
                .await;
        });
        Ok(())
    }

    fn on_server_exit(&self, generation: u64, result: std::io::Result<Option<i32>>) {
        let current = {
            let mut state = self.lock_state();
            match state.run {
                Some(run) if run.generation == generation => {
                    state.run = None;
                    state.started_at = None;
                    true
                }
                _ => false,
            }
        };
        if !current {
            debug!(branch = %self.inner.branch, generation, "ignoring exit of a stopped server");
            return;
        }

        let (state, message) = match result {
            Ok(Some(0)) => (ServerState::Stopped, None),
            Ok(Some(code)) => (
                ServerState::Error,
                Some(format!("Server exited with code {}", code)),
            ),
            Ok(None) => (
                ServerState::Error,
                Some("Server terminated by signal".to_string()),
            ),
            Err(e) => (ServerState::Error, Some(format!("Server error: {}", e))),
        };
        info!(branch = %self.inner.branch, ?state, "server exited");

        self.update_server(|server| {
            server.state = state;
            server.error_message = message;
            server.uptime_seconds = None;
        });
    }

    /// Classifies one line of server output.
    ///
    /// A ready line marks the server healthy. An error line marks it as
    /// failed unless it is currently healthy; the check and the write happen
    /// under the store lock.
    pub fn on_output_line(&self, line: &str) {
        let classifier = &self.inner.classifier;

        if let Some(address) = classifier.classify_ready(line) {
            self.update_server(|server| {
                server.state = ServerState::Healthy;
                server.url = Some(address.url);
                server.port = Some(address.port);
                server.error_message = None;
            });
        }

        if classifier.is_error(line) {
            let message = line.trim().to_string();
            let applied = self.apply_server(|server| {
                if server.state == ServerState::Healthy {
                    return false;
                }
                server.state = ServerState::Error;
                server.error_message = Some(message);
                true
            });
            if !applied {
                debug!(branch = %self.inner.branch, "error line ignored while healthy");
            }
        }
    }

    /// Stops the running server with SIGTERM.
    ///
    /// Returns `false` if no server is running.
    pub fn stop(&self) -> bool {
        let run = {
            let mut state = self.lock_state();
            let run = state.run.take();
            state.started_at = None;
            run
        };
        let Some(run) = run else {
            return false;
        };

        if let Some(pid) = run.pid {
            if let Err(e) = process::terminate(pid) {
                warn!(branch = %self.inner.branch, pid, error = %e, "failed to signal server");
            }
        }
        info!(branch = %self.inner.branch, "server stopped");

        self.update_server(|server| {
            server.state = ServerState::Stopped;
            server.uptime_seconds = None;
        });
        true
    }

    // ---- probes ----

    /// Probes the server over HTTP in the background.
    ///
    /// Returns `None` without probing if no address is known or the last
    /// probe was less than `health_check_interval` ago.
    pub fn check_server_health(&self) -> Option<JoinHandle<()>> {
        let url = match &self.inner.config.health_check_url {
            Some(url) => url.clone(),
            None => self.load_status().server.url?,
        };
        let handle = Handle::try_current().ok()?;

        {
            let mut state = self.lock_state();
            let interval = self.inner.config.health_check_interval;
            if !claim_probe_slot(&mut state.last_server_probe, interval, Instant::now()) {
                return None;
            }
        }

        let monitor = self.clone();
        Some(handle.spawn(async move { monitor.probe_server(url).await }))
    }

    async fn probe_server(&self, url: String) {
        let timeout = self.inner.config.health_check_timeout;
        let outcome = self.inner.http.get(&url, timeout).await;
        debug!(branch = %self.inner.branch, %url, ?outcome, "server probe finished");

        match outcome {
            Ok(200) => {
                let uptime = self
                    .lock_state()
                    .started_at
                    .map(|at| at.elapsed().as_secs_f64());
                self.persist(move |monitor| {
                    monitor.update_server(|server| {
                        server.state = ServerState::Healthy;
                        server.uptime_seconds = uptime;
                        server.error_message = None;
                    })
                })
                .await;
            }
            Ok(code) => {
                self.persist(move |monitor| {
                    monitor.update_server(|server| {
                        server.state = ServerState::Unhealthy;
                        server.error_message = Some(format!("HTTP {}", code));
                    })
                })
                .await;
            }
            Err(e) => {
                let message = e.to_string();
                self.persist(move |monitor| {
                    monitor.update_server(|server| {
                        server.state = ServerState::Error;
                        server.error_message = Some(message);
                    })
                })
                .await;
            }
        }
    }

    /// Probes the database with a TCP connect in the background.
    ///
    /// Returns `None` without probing if no connection string is configured
    /// or the last probe was less than `database_check_interval` ago.
    pub fn check_database_connection(&self) -> Option<JoinHandle<()>> {
        let conn = self.inner.config.database_connection_string.clone()?;
        let handle = Handle::try_current().ok()?;

        {
            let mut state = self.lock_state();
            let interval = self.inner.config.database_check_interval;
            if !claim_probe_slot(&mut state.last_db_probe, interval, Instant::now()) {
                return None;
            }
        }

        let monitor = self.clone();
        Some(handle.spawn(async move { monitor.probe_database(conn).await }))
    }

    async fn probe_database(&self, conn: String) {
        let (state, message) = match parse_db_address(&conn) {
            Some((host, port)) => {
                let timeout = self.inner.config.database_connect_timeout;
                if self.inner.tcp.connect(&host, port, timeout).await {
                    (DatabaseState::Connected, None)
                } else {
                    (DatabaseState::Error, Some("Connection refused".to_string()))
                }
            }
            None => (
                DatabaseState::Error,
                Some("Invalid connection string format".to_string()),
            ),
        };
        debug!(branch = %self.inner.branch, ?state, "database probe finished");

        self.persist(move |monitor| {
            monitor.update_database(|db| {
                db.state = state;
                db.error_message = message;
                db.connection_string = Some(conn);
            })
        })
        .await;
    }

    // ---- opaque summaries ----

    /// Replaces the build summary.
    pub fn record_build(&self, build: Value) {
        self.apply(|snapshot| {
            snapshot.build = build;
            true
        });
    }

    /// Replaces the test summary.
    pub fn record_tests(&self, tests: Value) {
        self.apply(|snapshot| {
            snapshot.tests = tests;
            true
        });
    }

    // ---- write path ----

    /// Runs a snapshot write on the blocking pool.
    async fn persist<F>(&self, f: F)
    where
        F: FnOnce(&ServerHealthMonitor) + Send + 'static,
    {
        let monitor = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || f(&monitor)).await {
            warn!(branch = %self.inner.branch, error = %e, "status write task failed");
        }
    }

    fn update_server(&self, f: impl FnOnce(&mut ServerHealth)) {
        self.apply_server(|server| {
            f(server);
            true
        });
    }

    fn apply_server(&self, f: impl FnOnce(&mut ServerHealth) -> bool) -> bool {
        self.apply(|snapshot| {
            if !f(&mut snapshot.server) {
                return false;
            }
            snapshot.server.touch();
            true
        })
    }

    fn update_database(&self, f: impl FnOnce(&mut DatabaseHealth)) {
        self.apply(|snapshot| {
            f(&mut snapshot.database);
            snapshot.database.touch();
            true
        });
    }

    /// Load, mutate, save, publish. Nothing is written or published if `f`
    /// returns false.
    fn apply(&self, f: impl FnOnce(&mut StatusSnapshot) -> bool) -> bool {
        let written = self
            .inner
            .store
            .update(|snapshot| f(&mut *snapshot).then(|| snapshot.clone()));

        match written {
            Some(snapshot) => {
                // No receivers is fine.
                let _ = self.inner.events.send(StatusEvent::SnapshotChanged {
                    branch: self.inner.branch.clone(),
                    snapshot,
                });
                true
            }
            None => false,
        }
    }
}
