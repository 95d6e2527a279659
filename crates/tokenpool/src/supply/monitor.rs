#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BackingStore, Error, Region, RegionCursor, Result, Supplier, SupplyReport, SupplyRequest,
    SystemClock, ThreadRandom, TimeSource, rand::RandSource,
};

/// Watches a region's supply and replenishes it before an allocation would
/// undershoot.
///
/// The monitor computes what is still available from the store and cursor,
/// asks the region's [`crate::ReplenishmentPolicy`] how much to fetch, and
/// calls the supplier synchronously. It never holds a region lock: a slow
/// supplier only delays the allocation that triggered it.
#[derive(Debug, Clone, Default)]
pub struct SupplyMonitor<T = SystemClock, R = ThreadRandom> {
    clock: T,
    rng: R,
}

impl SupplyMonitor {
    /// A monitor stamping requests with the system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T, R> SupplyMonitor<T, R>
where
    T: TimeSource<u64>,
    R: RandSource<u64>,
{
    /// A monitor with explicit clock and random sources.
    pub fn with_sources(clock: T, rng: R) -> Self {
        Self { clock, rng }
    }

    /// Replenishes `store` if fewer than `requested` tokens are available.
    ///
    /// Returns the supplier's report, or `None` when no replenishment was
    /// needed.
    ///
    /// # Errors
    ///
    /// - [`Error::ReplenishmentFailed`] if the supplier errors or reports
    ///   [`crate::SupplyStatus::Failure`]. The allocation must not proceed.
    /// - Any store error raised while measuring supply.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(region = %region.machine_name, requested)))]
    pub fn check_and_replenish<S>(
        &self,
        supplier: &S,
        region: &Region,
        store: &dyn BackingStore,
        cursor: &RegionCursor,
        requested: u64,
    ) -> Result<Option<SupplyReport>>
    where
        S: Supplier + ?Sized,
    {
        let available = store.available(cursor)?;
        let Some(amount) =
            region
                .replenishment_policy
                .amount(available, requested, region.replenishment_size)
        else {
            return Ok(None);
        };

        let request = SupplyRequest::new(amount, &self.clock, &self.rng);
        #[cfg(feature = "tracing")]
        tracing::info!(
            correlation_id = %request.correlation_id,
            available,
            amount,
            "replenishing region"
        );

        let report = supplier
            .supply(region, store, &request)
            .map_err(|e| Error::ReplenishmentFailed {
                correlation_id: request.correlation_id.clone(),
                reason: e.to_string(),
            })?;

        if !report.is_success() {
            return Err(Error::ReplenishmentFailed {
                correlation_id: request.correlation_id,
                reason: report
                    .detail
                    .unwrap_or_else(|| "supplier reported failure".to_string()),
            });
        }

        #[cfg(feature = "tracing")]
        if report.written_count < amount {
            tracing::warn!(
                correlation_id = %request.correlation_id,
                written = report.written_count,
                amount,
                "supplier wrote fewer tokens than requested"
            );
        }

        Ok(Some(report))
    }
}
