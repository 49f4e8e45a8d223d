//! Sync state directory.
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK            # Advisory lock, one process per account
//! ├─ queue.cbor      # Pending mutation markers
//! └─ tokens.cbor     # Change tokens and disabled zones
//! ```
//!
//! Every file is replaced atomically: the new contents are written to a
//! temporary sibling, synced, renamed over the old file, and the directory
//! is synced so the rename survives a crash.

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// File holding the pending mutation markers.
pub const QUEUE_FILE: &str = "queue.cbor";

/// File holding the change tokens.
pub const TOKENS_FILE: &str = "tokens.cbor";

/// Owns a sync state directory and its lock.
#[derive(Debug)]
pub struct SyncDir {
    path: PathBuf,
    _lock_file: File,
}

impl SyncDir {
    /// Opens or creates a state directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLocked` if another process holds the directory,
    /// or an I/O error if it is missing and `create_if_missing` is false.
    pub fn open(path: &Path, create_if_missing: bool) -> SyncResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(SyncError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("state directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of a file inside the directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Reads a file. Missing and empty files read as `None`.
    pub fn read(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Replaces a file atomically.
    pub fn write_atomic(&self, name: &str, data: &[u8]) -> SyncResult<()> {
        let target = self.file_path(name);
        let temp = self.file_path(&format!("{name}.tmp"));

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;
        self.sync_directory()
    }

    /// Reads and decodes a CBOR file.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> SyncResult<Option<T>> {
        match self.read(name)? {
            Some(data) => decode(&data).map(Some),
            None => Ok(None),
        }
    }

    /// Encodes a value as CBOR and replaces the file atomically.
    pub fn store<T: Serialize>(&self, name: &str, value: &T) -> SyncResult<()> {
        let data = encode(value)?;
        self.write_atomic(name, &data)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> SyncResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Encodes a value as CBOR.
pub fn encode<T: Serialize>(value: &T) -> SyncResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(SyncError::codec)?;
    Ok(out)
}

/// Decodes a CBOR value.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> SyncResult<T> {
    ciborium::from_reader(data).map_err(SyncError::codec)
}
