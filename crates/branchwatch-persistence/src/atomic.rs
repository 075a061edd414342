//! Atomic file operations for crash-safe persistence.
//!
//! Every write goes to a temporary file in the destination directory, which
//! is exclusively locked, fully written, flushed and synced before a single
//! rename over the destination. If anything fails before the rename, the
//! temp file is removed and the destination keeps its previous contents.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{PersistenceError, Result};

/// Writes data to a file atomically.
///
/// # Errors
/// Returns an error if the temp file cannot be created, locked, written,
/// synced or renamed.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    atomic_write_with(path, |file| file.write_all(data))
}

/// Writes JSON data to a file atomically.
///
/// The value is serialized before any file is touched, so a serialization
/// failure never leaves a temp file behind.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically replaces `path` with whatever `write` puts into the temp file.
///
/// `write` receives the locked temp file. An error from `write` aborts the
/// operation and leaves the destination untouched.
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let write_err = |source| PersistenceError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    // Ensure parent directory exists
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    // Temp file in same directory (for same-filesystem rename).
    // Dropping it on any early return deletes it.
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let mut temp_file = tempfile::Builder::new()
        .prefix(&format!(".tmp-{}-", stem))
        .tempfile_in(dir)
        .map_err(write_err)?;

    lock_exclusive(temp_file.as_file()).map_err(|source| PersistenceError::LockError {
        path: temp_file.path().to_path_buf(),
        source,
    })?;

    write(temp_file.as_file_mut()).map_err(write_err)?;

    // Flush and force to durable storage
    temp_file.as_file_mut().flush().map_err(write_err)?;
    temp_file.as_file().sync_all().map_err(write_err)?;

    // Atomic rename
    temp_file.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Takes an exclusive advisory lock on an open file.
///
/// The lock is released when the file handle is closed.
#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Reads and deserializes JSON from a file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|source| PersistenceError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_slice(&data)?;
    Ok(value)
}

/// Reads JSON from a file, returning None if the file doesn't exist.
///
/// Invalid UTF-8 is reported as [`PersistenceError::JsonError`].
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistenceError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}
