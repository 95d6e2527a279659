use crate::{RegionCursor, Result};

/// The capability set shared by every backing store variant.
///
/// A store is owned by exactly one region. Suppliers write into it through
/// [`BackingStore::append`]; the allocator reads from it through
/// [`BackingStore::pull`] while holding the region's lock.
pub trait BackingStore: Send + Sync {
    /// Creates the store if it does not exist yet. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreInit`] when the directory, file or table
    /// cannot be created.
    fn ensure_exists(&self) -> Result<()>;

    /// Number of entries physically present in the store.
    fn current_size(&self) -> Result<u64>;

    /// Number of entries that can still be issued given `cursor`.
    fn available(&self, cursor: &RegionCursor) -> Result<u64>;

    /// Removes or reads past exactly `count` tokens, advancing `cursor`.
    ///
    /// All-or-nothing: on error neither the store nor the cursor changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientData`] when fewer than `count`
    /// tokens are available.
    fn pull(&self, cursor: &mut RegionCursor, count: u64) -> Result<Vec<String>>;

    /// Appends `tokens` in order.
    fn append(&self, tokens: &[String]) -> Result<()>;
}
