use serde::{Deserialize, Serialize};

/// How much to ask the supplier for once a region runs short.
///
/// Both policies only trigger when `available < requested`; they differ in
/// whether a request that is already at least one batch large still gets
/// amplified.
///
/// # Example
///
/// ```
/// use tokenpool::ReplenishmentPolicy;
///
/// // 3 tokens left, 5 wanted, batches of 200.
/// assert_eq!(ReplenishmentPolicy::AtLeastBatch.amount(3, 5, 200), Some(200));
/// // 0 left, 300 wanted: the request is bigger than a batch.
/// assert_eq!(ReplenishmentPolicy::AtLeastBatch.amount(0, 300, 200), Some(300));
/// assert_eq!(ReplenishmentPolicy::BatchUnlessOversized.amount(100, 300, 200), Some(200));
/// // Enough supply: nothing to do.
/// assert_eq!(ReplenishmentPolicy::AtLeastBatch.amount(10, 5, 200), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplenishmentPolicy {
    /// Request `max(shortfall, replenishment_size)`: always at least a full
    /// batch, amortising supplier round-trips.
    #[default]
    AtLeastBatch,
    /// When `replenishment_size <= requested`, request exactly the shortfall;
    /// smaller requests still get a full batch.
    BatchUnlessOversized,
}

impl ReplenishmentPolicy {
    /// Number of tokens to request from the supplier, or `None` when
    /// `available` already covers `requested`.
    pub fn amount(self, available: u64, requested: u64, batch: u64) -> Option<u64> {
        if available >= requested {
            return None;
        }
        let shortfall = requested - available;
        Some(match self {
            Self::BatchUnlessOversized if batch <= requested => shortfall,
            Self::AtLeastBatch | Self::BatchUnlessOversized => shortfall.max(batch),
        })
    }
}
