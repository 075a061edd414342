//! Shell command runner with line-by-line output streaming.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};

/// Runs a shell command and feeds each output line to a callback.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: String,
    working_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Spawns `sh -c <command>` in the working directory.
    ///
    /// stdout and stderr are read concurrently; every line (without its
    /// terminator, invalid UTF-8 replaced) is passed to `on_line` on the
    /// blocking pool, in order per stream. On unix the child leads its own
    /// process group so [`terminate`] reaches everything it started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, on_line: F) -> Result<RunningCommand>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| MonitorError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(command = %self.command, ?pid, "spawned command");

        let on_line = Arc::new(on_line);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(stream_lines(stdout, Arc::clone(&on_line)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(stream_lines(stderr, on_line));
        }

        Ok(RunningCommand {
            pid,
            child,
            readers,
        })
    }
}

fn stream_lines<R, F>(reader: R, on_line: Arc<F>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(String) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    let on_line = Arc::clone(&on_line);
                    // Callbacks may block on disk writes.
                    if let Err(e) = tokio::task::spawn_blocking(move || on_line(line)).await {
                        warn!(error = %e, "output callback failed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stopped reading command output");
                    break;
                }
            }
        }
    })
}

/// Strips the line terminator and decodes lossily.
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// A spawned command.
#[derive(Debug)]
pub struct RunningCommand {
    pid: Option<u32>,
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

impl RunningCommand {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the command to exit and for its output to be drained.
    ///
    /// Returns the exit code, or `None` if the process was killed by a
    /// signal.
    pub async fn wait(mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        for reader in self.readers {
            let _ = reader.await;
        }
        Ok(status.code())
    }
}

/// Sends SIGTERM to the process group led by `pid`.
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if unsafe { libc::kill(-pgid, libc::SIGTERM) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "terminate is only supported on unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(String) + Send + Sync + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        (lines, move |line: String| sink.lock().unwrap().push(line))
    }

    #[tokio::test]
    async fn test_streams_stdout_and_stderr() {
        let dir = tempdir().unwrap();
        let (lines, on_line) = collector();

        let running = CommandRunner::new("echo one; echo two >&2; echo three", dir.path())
            .spawn(on_line)
            .unwrap();
        assert!(running.pid().is_some());

        let code = running.wait().await.unwrap();
        assert_eq!(code, Some(0));

        let mut lines = lines.lock().unwrap().clone();
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let dir = tempdir().unwrap();
        let (_, on_line) = collector();

        let running = CommandRunner::new("exit 3", dir.path()).spawn(on_line).unwrap();
        assert_eq!(running.wait().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let (lines, on_line) = collector();

        let running = CommandRunner::new("cat marker.txt", dir.path())
            .spawn(on_line)
            .unwrap();
        running.wait().await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["here".to_string()]);
    }

    #[tokio::test]
    async fn test_terminate_stops_process() {
        let dir = tempdir().unwrap();
        let (_, on_line) = collector();

        let running = CommandRunner::new("sleep 30", dir.path()).spawn(on_line).unwrap();
        terminate(running.pid().unwrap()).unwrap();

        let code = tokio::time::timeout(std::time::Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_stream() {
        let dir = tempdir().unwrap();
        let (lines, on_line) = collector();

        let running = CommandRunner::new(
            "printf 'caf\\351 loaded\\n'; sleep 0.2; echo still here",
            dir.path(),
        )
        .spawn(on_line)
        .unwrap();

        assert_eq!(running.wait().await.unwrap(), Some(0));
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["caf\u{FFFD} loaded".to_string(), "still here".to_string()]
        );
    }

    #[tokio::test]
    async fn test_crlf_terminators_stripped() {
        let dir = tempdir().unwrap();
        let (lines, on_line) = collector();

        let running = CommandRunner::new("printf 'one\\r\\ntwo'", dir.path())
            .spawn(on_line)
            .unwrap();
        running.wait().await.unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_slow_callback_does_not_stall_runtime() {
        let dir = tempdir().unwrap();
        let on_line = |_line: String| std::thread::sleep(std::time::Duration::from_millis(800));

        let running = CommandRunner::new("echo tick", dir.path()).spawn(on_line).unwrap();

        let started = std::time::Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(600));

        assert_eq!(running.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_missing_working_dir_fails_to_spawn() {
        let dir = tempdir().unwrap();
        let (_, on_line) = collector();

        let result = CommandRunner::new("true", dir.path().join("missing")).spawn(on_line);
        assert!(matches!(result, Err(MonitorError::Spawn { .. })));
    }
}
