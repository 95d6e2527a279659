use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, InsufficientData, RegionCursor, Result, store::BackingStore,
};

/// An append-only text file used as a line-addressed queue.
///
/// Each line holds one token; line numbers are 1-based. Tokens are consumed
/// *logically*: the region cursor moves past them, the file never shrinks.
/// Lines before the cursor are dead weight kept for audit and re-reads;
/// compacting them is an out-of-band operation.
///
/// Writers take an exclusive advisory lock on the file and readers a shared
/// one, so a read never observes half of an append. A final line without a
/// trailing newline is treated as still being written and is ignored.
///
/// # Example
///
/// ```
/// use tokenpool::{BackingStore, LineFileStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = LineFileStore::new(dir.path().join("numbers"));
/// store.ensure_exists().unwrap();
/// store.append(&["a".to_string(), "b".to_string(), "c".to_string()]).unwrap();
///
/// assert_eq!(store.current_size().unwrap(), 3);
/// assert_eq!(store.read_range(2, 2).unwrap(), ["b", "c"]);
/// ```
#[derive(Debug, Clone)]
pub struct LineFileStore {
    path: PathBuf,
}

impl LineFileStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `count` tokens starting at the 1-based line `start`.
    ///
    /// Every read scans the file from its first byte, so whatever another
    /// process appended, truncated or rewrote since the last call is seen.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientData::MissingLine`] naming the first requested
    /// line that is blank or lies beyond the end of the file. Line `0` is
    /// always missing.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = %self.path.display())))]
    pub fn read_range(&self, start: u64, count: u64) -> Result<Vec<String>> {
        if start == 0 {
            return Err(InsufficientData::MissingLine { line: 0 }.into());
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = start.saturating_add(count - 1);

        let mut reader = BufReader::new(self.open_shared()?);
        let mut tokens = Vec::new();
        let mut raw = Vec::new();
        let mut line = 0u64;
        while line < last {
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| Error::io(&self.path, e))?;
            // End of file, or a final line still being written.
            if read == 0 || raw.last() != Some(&b'\n') {
                break;
            }
            line += 1;
            if line < start {
                continue;
            }

            let text = std::str::from_utf8(&raw)
                .map_err(|e| Error::io(&self.path, io::Error::new(ErrorKind::InvalidData, e)))?;
            let token = text.trim();
            if token.is_empty() {
                return Err(InsufficientData::MissingLine { line }.into());
            }
            tokens.push(token.to_string());
        }

        let read = tokens.len() as u64;
        if read < count {
            return Err(InsufficientData::MissingLine { line: start + read }.into());
        }
        Ok(tokens)
    }

    fn open_shared(&self) -> Result<File> {
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        FileExt::lock_shared(&file).map_err(|e| Error::io(&self.path, e))?;
        Ok(file)
    }
}

impl BackingStore for LineFileStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn ensure_exists(&self) -> Result<()> {
        let init_err = |source| Error::StoreInit {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(init_err)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(init_err)?;
        Ok(())
    }

    fn current_size(&self) -> Result<u64> {
        let file = match self.open_shared() {
            Ok(file) => file,
            Err(Error::Io { source, .. }) if source.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut reader = BufReader::new(file);
        let mut lines = 0u64;
        loop {
            let buf = reader.fill_buf().map_err(|e| Error::io(&self.path, e))?;
            if buf.is_empty() {
                break;
            }
            lines += buf.iter().filter(|b| **b == b'\n').count() as u64;
            let consumed = buf.len();
            reader.consume(consumed);
        }
        Ok(lines)
    }

    fn available(&self, cursor: &RegionCursor) -> Result<u64> {
        Ok((self.current_size()? + 1).saturating_sub(cursor.last_position))
    }

    fn pull(&self, cursor: &mut RegionCursor, count: u64) -> Result<Vec<String>> {
        let tokens = self.read_range(cursor.last_position, count)?;
        cursor.advance(count);
        Ok(tokens)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(count = tokens.len())))]
    fn append(&self, tokens: &[String]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let mut buf = String::with_capacity(tokens.iter().map(|t| t.len() + 1).sum::<usize>() + 1);
        for token in tokens {
            super::validate_token(token)?;
            buf.push_str(token);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        file.lock_exclusive()
            .map_err(|e| Error::io(&self.path, e))?;

        // An unterminated final line written by someone else is completed
        // before our first token.
        let len = file.metadata().map_err(|e| Error::io(&self.path, e))?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))
                .and_then(|_| file.read_exact(&mut last))
                .map_err(|e| Error::io(&self.path, e))?;
            if last[0] != b'\n' {
                buf.insert(0, '\n');
            }
        }

        file.write_all(buf.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }
}
