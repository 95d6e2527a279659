mod handle;
#[cfg(test)]
mod tests;

pub use handle::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BackingStore, Result, RuleContext, RulePhase, Supplier, SupplyMonitor, SystemClock,
    ThreadRandom, TimeSource, rand::RandSource,
};

/// Hands out tokens from regions, replenishing them through a [`Supplier`]
/// when they run short.
///
/// One allocator can serve any number of regions; all per-region state lives
/// in the [`RegionHandle`].
///
/// # Example
///
/// ```
/// use tokenpool::{Allocator, Region, RegionHandle, StoreKind, UuidSupplier};
///
/// let dir = tempfile::tempdir().unwrap();
/// let region = Region::new("orders", StoreKind::LineFile, dir.path(), 100);
/// let handle = RegionHandle::open(region).unwrap();
/// let allocator = Allocator::new(UuidSupplier);
///
/// let first = allocator.allocate(&handle, 3).unwrap();
/// let next = allocator.allocate(&handle, 2).unwrap();
/// assert_eq!(first.len(), 3);
/// assert_eq!(next.len(), 2);
/// assert!(next.iter().all(|token| !first.contains(token)));
/// assert_eq!(handle.cursor_snapshot().unwrap().last_position, 6);
/// ```
#[derive(Debug)]
pub struct Allocator<S, T = SystemClock, R = ThreadRandom> {
    supplier: S,
    monitor: SupplyMonitor<T, R>,
}

impl<S> Allocator<S>
where
    S: Supplier,
{
    /// An allocator replenishing through `supplier`, stamping supply requests
    /// with the system clock.
    pub fn new(supplier: S) -> Self {
        Self {
            supplier,
            monitor: SupplyMonitor::new(),
        }
    }
}

impl<S, T, R> Allocator<S, T, R>
where
    S: Supplier,
    T: TimeSource<u64>,
    R: RandSource<u64>,
{
    /// An allocator with an explicitly configured [`SupplyMonitor`].
    pub fn with_monitor(supplier: S, monitor: SupplyMonitor<T, R>) -> Self {
        Self { supplier, monitor }
    }

    /// The supplier used for replenishment.
    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    /// Issues the next `count` tokens of the region, in order.
    ///
    /// Steps: make sure the store exists, run the pre-rules, replenish if
    /// supply is short (outside the region lock), pull under the region lock
    /// and persist the cursor, then run the post-rules. Every token is issued
    /// at most once, even across crashes and processes.
    ///
    /// A `count` of zero runs the pre-rules and returns an empty vector
    /// without touching supply or cursor.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::StoreInit`] if the store cannot be created.
    /// - [`crate::Error::Rule`] if a pre-rule refuses the request (nothing is
    ///   issued) or a post-rule refuses the result (the tokens stay issued).
    /// - [`crate::Error::ReplenishmentFailed`] if the supplier fails.
    /// - [`crate::Error::InsufficientData`] if the store still lacks tokens.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, handle), fields(region = %handle.region().machine_name)))]
    pub fn allocate(&self, handle: &RegionHandle, count: u64) -> Result<Vec<String>> {
        let region = handle.region();
        let store = handle.store();
        store.ensure_exists()?;

        handle.pre_rules().execute(&RuleContext {
            region,
            size: count,
            phase: RulePhase::Pre,
            tokens: None,
        })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let cursor = handle.cursor_snapshot()?;
        self.monitor
            .check_and_replenish(&self.supplier, region, store, &cursor, count)?;

        let tokens = handle.pull(count)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(issued = tokens.len(), "allocated tokens");

        handle.post_rules().execute(&RuleContext {
            region,
            size: count,
            phase: RulePhase::Post,
            tokens: Some(&tokens),
        })?;
        Ok(tokens)
    }
}
