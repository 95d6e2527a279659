use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{rules::RuleError, store::StoreKind};

/// A result type defaulting to the crate [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `tokenpool` can produce.
///
/// Every variant is fatal to the single `allocate` call that raised it. The
/// core never retries on its own; use [`Error::is_supply_exhausted`],
/// [`Error::is_storage_failure`] and [`Error::is_supplier_failure`] to decide
/// what an operator (or a caller-level retry policy) should do next.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The backing store (directory, file, database or table) could not be
    /// created.
    #[error("failed to initialise store at {}: {source}", path.display())]
    StoreInit {
        /// Path of the store that failed to initialise.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The store does not hold enough tokens to satisfy the request, even
    /// after replenishment.
    #[error(transparent)]
    InsufficientData(#[from] InsufficientData),

    /// The supplier did not complete successfully. Nothing was issued.
    #[error("replenishment {correlation_id} failed: {reason}")]
    ReplenishmentFailed {
        /// Correlation id of the failed supply request.
        correlation_id: String,
        /// Status detail or error message reported by the supplier.
        reason: String,
    },

    /// A pre- or post-processing rule rejected the request.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Reading or writing an initialised store failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The row store's database reported an error.
    #[cfg_attr(docsrs, doc(cfg(feature = "row-store")))]
    #[cfg(feature = "row-store")]
    #[error("row store error: {0}")]
    Database(#[from] sled::Error),

    /// Appending would store a token that is already present. The whole batch
    /// was rolled back.
    #[error("duplicate token {token:?}")]
    DuplicateToken {
        /// The offending token.
        token: String,
    },

    /// A supplied token is blank, padded with whitespace, or spans lines.
    #[error("invalid token {token:?}")]
    InvalidToken {
        /// The offending token.
        token: String,
    },

    /// The persisted region cursor could not be read or is invalid.
    #[error("corrupt cursor at {}: {reason}", path.display())]
    CursorCorrupt {
        /// Path of the cursor file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The region asks for a store variant that was not compiled in.
    #[error("store kind {kind:?} is not supported by this build")]
    UnsupportedStore {
        /// The requested kind.
        kind: StoreKind,
    },

    /// A region lock was poisoned by a panicking thread.
    ///
    /// `parking_lot` mutexes do not poison, so this variant only exists
    /// without the `parking-lot` feature.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("region lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The region ran out of supply.
    pub fn is_supply_exhausted(&self) -> bool {
        matches!(self, Self::InsufficientData(_))
    }

    /// Storage or configuration is broken and needs operator attention.
    pub fn is_storage_failure(&self) -> bool {
        match self {
            Self::StoreInit { .. }
            | Self::Io { .. }
            | Self::DuplicateToken { .. }
            | Self::InvalidToken { .. }
            | Self::CursorCorrupt { .. }
            | Self::UnsupportedStore { .. } => true,
            #[cfg(feature = "row-store")]
            Self::Database(_) => true,
            _ => false,
        }
    }

    /// The upstream supplier could not be reached or refused the request.
    pub fn is_supplier_failure(&self) -> bool {
        matches!(self, Self::ReplenishmentFailed { .. })
    }
}

/// Details of an [`Error::InsufficientData`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsufficientData {
    /// A line-file read hit a blank line or ran past the end of the file.
    #[error("not enough tokens available: line {line} is missing")]
    MissingLine {
        /// The first missing 1-based line number.
        line: u64,
    },
    /// A row-store take asked for more rows than exist.
    #[error("not enough tokens available: {available} available, {requested} requested")]
    Shortfall {
        /// Rows present when the take was attempted.
        available: u64,
        /// Rows requested.
        requested: u64,
    },
}

#[cfg(not(feature = "parking-lot"))]
use crate::mutex::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
