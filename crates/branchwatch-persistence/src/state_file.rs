//! Generic read/modify/write wrapper around one JSON state file.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Suffix appended to a state file that failed to parse.
pub const CORRUPTED_SUFFIX: &str = ".corrupted";

/// What to do with a state file whose contents cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Leave the file in place and treat it as empty.
    #[default]
    Ignore,
    /// Rename the file aside (best effort) and treat it as empty.
    Quarantine,
}

/// A per-branch JSON state file with crash-safe writes.
///
/// Writers within one process are serialized by an internal mutex so a
/// read/modify/write cycle never interleaves with another one from the same
/// process. Across processes the last atomic rename wins. Reads never lock.
pub struct JsonStateFile<T> {
    path: PathBuf,
    policy: CorruptionPolicy,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for JsonStateFile<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStateFile")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> JsonStateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Creates a handle for the file at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: CorruptionPolicy::Ignore,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Sets the corruption policy.
    pub fn with_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path a corrupted file is moved to.
    pub fn quarantine_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(CORRUPTED_SUFFIX);
        PathBuf::from(name)
    }

    /// Loads the state, or `None` if the file is missing or unreadable.
    ///
    /// Never fails: problems are reported through `tracing` and, under
    /// [`CorruptionPolicy::Quarantine`], the bad file is renamed aside.
    pub fn load(&self) -> Option<T> {
        match read_json_optional(&self.path) {
            Ok(value) => value,
            Err(PersistenceError::JsonError(e)) => {
                warn!(path = %self.path.display(), error = %e, "state file is corrupted");
                if self.policy == CorruptionPolicy::Quarantine {
                    self.quarantine();
                }
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read state file");
                None
            }
        }
    }

    /// Loads the state, falling back to `T::default()`.
    pub fn load_or_default(&self) -> T {
        self.load().unwrap_or_default()
    }

    /// Writes the state atomically.
    pub fn save(&self, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        atomic_write_json(&self.path, value)
    }

    /// Loads, applies `f`, and writes back if `f` returns `Some`.
    ///
    /// A write failure is logged and dropped; the value computed by `f` is
    /// still returned so the caller sees the in-memory outcome.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> Option<R>) -> Option<R> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut state = self.load_or_default();
        let result = f(&mut state)?;

        if let Err(e) = atomic_write_json(&self.path, &state) {
            warn!(path = %self.path.display(), error = %e, "failed to save state file");
        }
        Some(result)
    }

    /// Renames the current file aside. Failures are swallowed.
    fn quarantine(&self) {
        let backup = self.quarantine_path();
        match fs::rename(&self.path, &backup) {
            Ok(()) => warn!(backup = %backup.display(), "corrupted state file backed up"),
            Err(e) => debug!(error = %e, "could not back up corrupted state file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        count: u32,
        #[serde(default)]
        label: Option<String>,
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let file: JsonStateFile<Counter> = JsonStateFile::new(dir.path().join("c.json"));

        assert!(file.load().is_none());
        assert_eq!(file.load_or_default(), Counter::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let file: JsonStateFile<Counter> = JsonStateFile::new(dir.path().join("c.json"));

        let value = Counter {
            count: 7,
            label: None,
        };
        file.save(&value).unwrap();

        assert_eq!(file.load(), Some(value));
        let raw = fs::read_to_string(file.path()).unwrap();
        assert!(raw.contains("\"label\": null"));
    }

    #[test]
    fn test_update_writes_only_on_some() {
        let dir = tempdir().unwrap();
        let file: JsonStateFile<Counter> = JsonStateFile::new(dir.path().join("c.json"));

        let skipped: Option<()> = file.update(|_| None);
        assert!(skipped.is_none());
        assert!(!file.path().exists());

        let count = file.update(|c| {
            c.count += 1;
            Some(c.count)
        });
        assert_eq!(count, Some(1));
        assert_eq!(file.load_or_default().count, 1);
    }

    #[test]
    fn test_corrupt_file_ignored_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, "not json at all").unwrap();

        let file: JsonStateFile<Counter> = JsonStateFile::new(&path);

        assert!(file.load().is_none());
        assert!(path.exists());
        assert!(!file.quarantine_path().exists());
    }

    #[test]
    fn test_corrupt_file_quarantined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, "{\"count\": ").unwrap();

        let file: JsonStateFile<Counter> =
            JsonStateFile::new(&path).with_policy(CorruptionPolicy::Quarantine);

        assert!(file.load().is_none());
        assert!(!path.exists());

        let backup = dir.path().join("c.json.corrupted");
        assert_eq!(file.quarantine_path(), backup);
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{\"count\": ");
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let dir = tempdir().unwrap();
        let file: Arc<JsonStateFile<Counter>> =
            Arc::new(JsonStateFile::new(dir.path().join("c.json")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let file = Arc::clone(&file);
                thread::spawn(move || {
                    for _ in 0..10 {
                        file.update(|c| {
                            c.count += 1;
                            Some(())
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(file.load_or_default().count, 80);
    }
}
