use crate::{
    TimeSource,
    rand::{RandSource, random_name, random_number},
};

/// An ephemeral description of one replenishment.
///
/// Never persisted; the `correlation_id` lets a supplier (and its logs) tell
/// repeated calls apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyRequest {
    /// Number of tokens the supplier should write.
    pub requested_size: u64,
    /// Unique id of this request.
    pub correlation_id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp_millis: u64,
    /// A random number for suppliers whose upstream wants a nonce.
    pub random_number: u64,
}

impl SupplyRequest {
    /// Creates a request for `requested_size` tokens stamped by `clock`.
    pub fn new<T, R>(requested_size: u64, clock: &T, rng: &R) -> Self
    where
        T: TimeSource<u64>,
        R: RandSource<u64>,
    {
        Self {
            requested_size,
            correlation_id: random_name(),
            timestamp_millis: clock.current_millis(),
            random_number: random_number(rng),
        }
    }
}

/// Outcome reported by a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyStatus {
    /// The tokens were written to the store.
    Success,
    /// The supplier gave up; whatever it wrote must not be relied on.
    Failure,
}

/// What a supplier reports back after a [`SupplyRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyReport {
    /// Whether the request completed.
    pub status: SupplyStatus,
    /// Number of tokens written into the store.
    pub written_count: u64,
    /// Free-form detail, e.g. the upstream error message.
    pub detail: Option<String>,
}

impl SupplyReport {
    /// A successful report for `written_count` tokens.
    pub fn success(written_count: u64) -> Self {
        Self {
            status: SupplyStatus::Success,
            written_count,
            detail: None,
        }
    }

    /// A failed report carrying `detail`.
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            status: SupplyStatus::Failure,
            written_count: 0,
            detail: Some(detail.into()),
        }
    }

    /// `true` when the supplier reported success.
    pub fn is_success(&self) -> bool {
        self.status == SupplyStatus::Success
    }
}
