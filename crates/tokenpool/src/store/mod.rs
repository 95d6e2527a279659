mod interface;
mod line_file;
#[cfg(feature = "row-store")]
mod row;

pub use interface::*;
pub use line_file::*;
#[cfg_attr(docsrs, doc(cfg(feature = "row-store")))]
#[cfg(feature = "row-store")]
pub use row::*;

use serde::{Deserialize, Serialize};

use crate::{Error, Region, RegionCursor, Result};

/// The closed set of backing store variants a region can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Append-only text file, one token per line, consumed by cursor.
    #[serde(alias = "file")]
    LineFile,
    /// Transactional table, consumed by deleting rows.
    #[serde(alias = "database")]
    Row,
}

/// A region's backing store, selected by [`Region::store_kind`].
#[derive(Debug)]
pub enum Store {
    /// See [`LineFileStore`].
    LineFile(LineFileStore),
    /// See [`RowStore`].
    #[cfg_attr(docsrs, doc(cfg(feature = "row-store")))]
    #[cfg(feature = "row-store")]
    Row(RowStore),
}

impl Store {
    /// Builds the store variant the region asks for. Nothing is created on
    /// disk until [`BackingStore::ensure_exists`] runs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedStore`] when the region selects the
    /// row store and the `row-store` feature is disabled.
    pub fn open(region: &Region) -> Result<Self> {
        match region.store_kind {
            StoreKind::LineFile => Ok(Self::LineFile(LineFileStore::new(region.store_path()))),
            #[cfg(feature = "row-store")]
            StoreKind::Row => Ok(Self::Row(RowStore::new(
                region.store_path(),
                region.table_name(),
            ))),
            #[cfg(not(feature = "row-store"))]
            kind @ StoreKind::Row => Err(crate::Error::UnsupportedStore { kind }),
        }
    }

    /// The variant of this store.
    pub fn kind(&self) -> StoreKind {
        match self {
            Self::LineFile(_) => StoreKind::LineFile,
            #[cfg(feature = "row-store")]
            Self::Row(_) => StoreKind::Row,
        }
    }

    fn inner(&self) -> &dyn BackingStore {
        match self {
            Self::LineFile(store) => store,
            #[cfg(feature = "row-store")]
            Self::Row(store) => store,
        }
    }
}

impl BackingStore for Store {
    fn ensure_exists(&self) -> Result<()> {
        self.inner().ensure_exists()
    }

    fn current_size(&self) -> Result<u64> {
        self.inner().current_size()
    }

    fn available(&self, cursor: &RegionCursor) -> Result<u64> {
        self.inner().available(cursor)
    }

    fn pull(&self, cursor: &mut RegionCursor, count: u64) -> Result<Vec<String>> {
        self.inner().pull(cursor, count)
    }

    fn append(&self, tokens: &[String]) -> Result<()> {
        self.inner().append(tokens)
    }
}

/// Rejects tokens that cannot round-trip through either store: blank ones,
/// ones with surrounding whitespace, and ones spanning several lines.
pub(crate) fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() || token.trim() != token || token.contains(['\n', '\r']) {
        return Err(Error::InvalidToken {
            token: token.to_string(),
        });
    }
    Ok(())
}
