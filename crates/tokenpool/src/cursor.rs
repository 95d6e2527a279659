use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Persistent allocation state of a region.
///
/// For line-file stores `last_position` is the 1-based line number of the
/// next token to issue. Row stores consume destructively and never move it;
/// for them only `issued` advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCursor {
    /// Next line to issue (line-file stores). Always `>= 1`.
    pub last_position: u64,
    /// Total number of tokens issued from the region so far.
    pub issued: u64,
}

impl Default for RegionCursor {
    fn default() -> Self {
        Self {
            last_position: 1,
            issued: 0,
        }
    }
}

impl RegionCursor {
    /// Records that `count` tokens were read starting at `last_position`.
    pub fn advance(&mut self, count: u64) {
        self.last_position += count;
        self.issued += count;
    }
}

/// On-disk home of a [`RegionCursor`] plus the lock file serialising
/// allocations across processes.
///
/// Writes go to a temp file that is synced and then renamed over the cursor
/// file, so a reader sees either the old or the new cursor, never a torn one.
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive advisory lock on a region. Released on drop.
#[derive(Debug)]
pub struct CursorLock {
    _file: File,
}

impl CursorFile {
    /// Creates a handle for the cursor at `path`, locked through `lock_path`.
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    /// Path of the cursor file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until this process holds the region's exclusive lock.
    pub fn lock(&self) -> Result<CursorLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| Error::io(&self.lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| Error::io(&self.lock_path, e))?;
        Ok(CursorLock { _file: file })
    }

    /// Loads the cursor. A missing file is a fresh region.
    pub fn load(&self) -> Result<RegionCursor> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RegionCursor::default()),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        let mut json = String::new();
        file.read_to_string(&mut json)
            .map_err(|e| Error::io(&self.path, e))?;

        let cursor: RegionCursor =
            serde_json::from_str(&json).map_err(|e| self.corrupt(e.to_string()))?;
        if cursor.last_position == 0 {
            return Err(self.corrupt("last_position must be at least 1".into()));
        }
        Ok(cursor)
    }

    /// Atomically replaces the persisted cursor.
    pub fn store(&self, cursor: &RegionCursor) -> Result<()> {
        let json = serde_json::to_vec(cursor).map_err(|e| self.corrupt(e.to_string()))?;
        let temp_path = self.path.with_extension("cursor.tmp");

        let mut file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
        file.write_all(&json)
            .map_err(|e| Error::io(&temp_path, e))?;
        file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CursorCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}
