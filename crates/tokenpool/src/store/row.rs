use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use sled::{
    Db, IVec, Transactional, Tree,
    transaction::{ConflictableTransactionError, TransactionError, abort},
};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, InsufficientData, RegionCursor, Result,
    mutex::{Mutex, lock},
    store::{BackingStore, validate_token},
};

const ISSUED_KEY: &[u8] = b"issued";
const UNUSED: u8 = 0;
/// Index value left behind for a token that has been taken.
const CONSUMED: &[u8] = b"consumed";

/// A transactional table of tokens, consumed by deleting rows.
///
/// Rows are `(token, used)` pairs keyed by a monotonically increasing row id,
/// so a take returns tokens in insertion order. The table is a sled tree named
/// after the region (`REGION_<store id>`), with two companion trees: a unique
/// index over tokens and a metadata tree holding the issued counter. Taking a
/// row keeps its token in the index, so a consumed token can never be
/// appended again.
///
/// Every take selects and deletes its rows in a single transaction together
/// with the counter update: two concurrent takes can never hand out the same
/// row, and a take that cannot be satisfied in full deletes nothing.
///
/// sled locks its database directory for the whole process, so open a row
/// store once and share it.
#[derive(Debug)]
pub struct RowStore {
    path: PathBuf,
    table: String,
    trees: Mutex<Option<RowTrees>>,
}

#[derive(Debug, Clone)]
struct RowTrees {
    db: Db,
    rows: Tree,
    tokens: Tree,
    meta: Tree,
}

/// A row selected for a take was removed before the take committed.
#[derive(Debug)]
struct Vanished;

impl RowStore {
    /// Creates a row store for `table` inside the database at `path`.
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            trees: Mutex::new(None),
        }
    }

    /// Path of the database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the token table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Total number of tokens taken from this store.
    pub fn issued(&self) -> Result<u64> {
        let trees = self.trees()?;
        Ok(trees
            .meta
            .get(ISSUED_KEY)?
            .map(|v| decode_counter(&v))
            .unwrap_or(0))
    }

    /// Atomically removes and returns `count` unused rows in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientData::Shortfall`] if fewer than `count` rows are
    /// available. Nothing is deleted in that case.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(table = %self.table)))]
    pub fn take_range(&self, count: u64) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let trees = self.trees()?;

        loop {
            let available = trees.rows.len() as u64;
            if available < count {
                return Err(InsufficientData::Shortfall {
                    available,
                    requested: count,
                }
                .into());
            }

            let mut keys = Vec::with_capacity(count as usize);
            for row in trees.rows.iter() {
                let (key, value) = row?;
                if value.first() == Some(&UNUSED) {
                    keys.push(key);
                    if keys.len() as u64 == count {
                        break;
                    }
                }
            }
            if (keys.len() as u64) < count {
                return Err(InsufficientData::Shortfall {
                    available: trees.rows.len() as u64,
                    requested: count,
                }
                .into());
            }

            let outcome = (&trees.rows, &trees.tokens, &trees.meta).transaction(
                |(rows, tokens, meta)| {
                    let mut taken = Vec::with_capacity(keys.len());
                    for key in &keys {
                        let Some(row) = rows.remove(key.clone())? else {
                            return abort(Vanished);
                        };
                        let token = decode_token(&row);
                        tokens.insert(token.as_bytes(), CONSUMED)?;
                        taken.push(token);
                    }
                    let issued = meta
                        .get(ISSUED_KEY)?
                        .map(|v| decode_counter(&v))
                        .unwrap_or(0);
                    meta.insert(ISSUED_KEY, (issued + count).to_be_bytes().to_vec())?;
                    Ok(taken)
                },
            );

            match outcome {
                Ok(taken) => {
                    // The deletion must be durable before anyone sees the
                    // tokens, or a crash could resurrect issued rows.
                    trees.db.flush()?;
                    return Ok(taken);
                }
                // Another handle on the same table took one of the selected
                // rows between the scan and the commit: select again.
                Err(TransactionError::Abort(Vanished)) => continue,
                Err(TransactionError::Storage(e)) => return Err(e.into()),
            }
        }
    }

    fn trees(&self) -> Result<RowTrees> {
        let mut trees = lock(&self.trees)?;
        if let Some(trees) = trees.as_ref() {
            return Ok(trees.clone());
        }
        let opened = self.open()?;
        *trees = Some(opened.clone());
        Ok(opened)
    }

    fn open(&self) -> Result<RowTrees> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::StoreInit {
                path: self.path.clone(),
                source,
            })?;
        }
        let db = sled::open(&self.path).map_err(|e| self.init_error(e))?;
        let rows = db.open_tree(&self.table).map_err(|e| self.init_error(e))?;
        let tokens = db
            .open_tree(format!("{}_tokens", self.table))
            .map_err(|e| self.init_error(e))?;
        let meta = db
            .open_tree(format!("{}_meta", self.table))
            .map_err(|e| self.init_error(e))?;
        Ok(RowTrees {
            db,
            rows,
            tokens,
            meta,
        })
    }

    fn init_error(&self, e: sled::Error) -> Error {
        let source = match e {
            sled::Error::Io(io) => io,
            other => std::io::Error::other(other.to_string()),
        };
        Error::StoreInit {
            path: self.path.clone(),
            source,
        }
    }
}

impl BackingStore for RowStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn ensure_exists(&self) -> Result<()> {
        self.trees().map(|_| ())
    }

    fn current_size(&self) -> Result<u64> {
        Ok(self.trees()?.rows.len() as u64)
    }

    fn available(&self, _cursor: &RegionCursor) -> Result<u64> {
        self.current_size()
    }

    fn pull(&self, cursor: &mut RegionCursor, count: u64) -> Result<Vec<String>> {
        let tokens = self.take_range(count)?;
        cursor.issued = self.issued()?;
        Ok(tokens)
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(table = %self.table, count = tokens.len())))]
    fn append(&self, tokens: &[String]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::with_capacity(tokens.len());
        for token in tokens {
            validate_token(token)?;
            if !seen.insert(token.as_str()) {
                return Err(Error::DuplicateToken {
                    token: token.clone(),
                });
            }
        }

        let trees = self.trees()?;
        let ids = tokens
            .iter()
            .map(|_| trees.db.generate_id())
            .collect::<sled::Result<Vec<u64>>>()?;

        let outcome = (&trees.rows, &trees.tokens).transaction(|(rows, index)| {
            for (id, token) in ids.iter().zip(tokens) {
                let key = id.to_be_bytes();
                if index.get(token.as_bytes())?.is_some() {
                    return abort(token.clone());
                }
                let mut row = Vec::with_capacity(token.len() + 1);
                row.push(UNUSED);
                row.extend_from_slice(token.as_bytes());
                rows.insert(&key[..], row)?;
                index.insert(token.as_bytes(), &key[..])?;
            }
            Ok::<_, ConflictableTransactionError<String>>(())
        });

        match outcome {
            Ok(()) => {
                trees.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(token)) => Err(Error::DuplicateToken { token }),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

fn decode_token(row: &IVec) -> String {
    String::from_utf8_lossy(&row[1..]).into_owned()
}

fn decode_counter(value: &IVec) -> u64 {
    <[u8; 8]>::try_from(&value[..])
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}
