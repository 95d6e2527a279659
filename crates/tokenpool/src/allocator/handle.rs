#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BackingStore, CursorFile, Region, RegionCursor, Result, Rule, RuleChain, Store, StoreKind,
    mutex::{Mutex, lock},
};

/// A region opened for allocation: its configuration, its store, its cursor
/// and the lock serialising pulls.
///
/// Open one handle per region and share it (e.g. behind an `Arc`) between
/// every thread allocating from that region. Pulls on the same handle are
/// serialised by an in-process mutex; pulls from other processes sharing the
/// store directory are serialised by an advisory lock on
/// [`Region::lock_path`].
#[derive(Debug)]
pub struct RegionHandle {
    region: Region,
    store: Store,
    cursor: CursorFile,
    lock: Mutex<()>,
    pre_rules: RuleChain,
    post_rules: RuleChain,
}

/// A point-in-time view of a region's supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStatus {
    /// The store variant.
    pub store_kind: StoreKind,
    /// Entries physically present in the store.
    pub store_size: u64,
    /// The persisted cursor.
    pub cursor: RegionCursor,
    /// Entries that can still be issued.
    pub available: u64,
}

impl RegionHandle {
    /// Opens `region`, building its rule chains from [`Region::rules`].
    ///
    /// Nothing is created on disk until the first allocation (or an explicit
    /// [`BackingStore::ensure_exists`] on [`RegionHandle::store`]).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedStore`] when the region's store kind
    /// was not compiled in.
    pub fn open(region: Region) -> Result<Self> {
        let store = Store::open(&region)?;
        let cursor = CursorFile::new(region.cursor_path(), region.lock_path());
        let pre_rules = RuleChain::from_specs(&region.rules.pre);
        let post_rules = RuleChain::from_specs(&region.rules.post);
        Ok(Self {
            region,
            store,
            cursor,
            lock: Mutex::new(()),
            pre_rules,
            post_rules,
        })
    }

    /// Appends a caller-supplied rule to the pre-processing chain.
    pub fn with_pre_rule<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.pre_rules.push(rule);
        self
    }

    /// Appends a caller-supplied rule to the post-processing chain.
    pub fn with_post_rule<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.post_rules.push(rule);
        self
    }

    /// The region's configuration.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// The region's backing store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn pre_rules(&self) -> &RuleChain {
        &self.pre_rules
    }

    pub(crate) fn post_rules(&self) -> &RuleChain {
        &self.post_rules
    }

    /// Reads the persisted cursor without taking the region lock.
    ///
    /// Cursor writes are atomic renames, so this is always a consistent
    /// value, though it may be stale by the time it is used.
    pub fn cursor_snapshot(&self) -> Result<RegionCursor> {
        self.cursor.load()
    }

    /// Reports store size, cursor and availability.
    pub fn status(&self) -> Result<RegionStatus> {
        let cursor = self.cursor_snapshot()?;
        Ok(RegionStatus {
            store_kind: self.store.kind(),
            store_size: self.store.current_size()?,
            cursor,
            available: self.store.available(&cursor)?,
        })
    }

    /// The critical section: read the cursor, pull `count` tokens, persist
    /// the advanced cursor.
    ///
    /// The cursor is persisted before the tokens are handed back. A crash
    /// between the two loses those tokens but can never issue them twice.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(region = %self.region.machine_name)))]
    pub(crate) fn pull(&self, count: u64) -> Result<Vec<String>> {
        let _guard = lock(&self.lock)?;
        let _file_lock = self.cursor.lock()?;

        let mut cursor = self.cursor.load()?;
        let tokens = self.store.pull(&mut cursor, count)?;
        self.cursor.store(&cursor)?;
        Ok(tokens)
    }
}
