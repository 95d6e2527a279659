use uuid::Uuid;

use crate::{BackingStore, Region, SupplyReport, SupplyRequest};

/// Error type suppliers may fail with. Any such error aborts the allocation
/// as [`crate::Error::ReplenishmentFailed`].
pub type SupplierError = Box<dyn core::error::Error + Send + Sync>;

/// An external capability that manufactures new tokens on demand.
///
/// A supplier is invoked synchronously and may block for as long as its
/// upstream takes; it must bound that wait itself (transport timeouts) and
/// report a stuck upstream as an error or a [`SupplyReport::failure`].
/// Before reporting success it must have written the new tokens into `store`
/// with [`BackingStore::append`].
///
/// Closures with the same signature implement this trait:
///
/// ```
/// use tokenpool::{BackingStore, Region, SupplierError, SupplyReport, SupplyRequest};
///
/// let supplier = |_: &Region, store: &dyn BackingStore, req: &SupplyRequest| {
///     let tokens: Vec<String> = (0..req.requested_size).map(|i| format!("SN{i:06}")).collect();
///     store.append(&tokens)?;
///     Ok::<_, SupplierError>(SupplyReport::success(req.requested_size))
/// };
/// # fn assert_supplier<S: tokenpool::Supplier>(_: &S) {}
/// # assert_supplier(&supplier);
/// ```
pub trait Supplier: Send + Sync {
    /// Writes `request.requested_size` new tokens into `store`.
    fn supply(
        &self,
        region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError>;
}

impl<F> Supplier for F
where
    F: Fn(&Region, &dyn BackingStore, &SupplyRequest) -> Result<SupplyReport, SupplierError>
        + Send
        + Sync,
{
    fn supply(
        &self,
        region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError> {
        self(region, store, request)
    }
}

/// A self-contained supplier producing random UUID v4 tokens.
///
/// Works with either store kind: for a line file it appends lines, for a row
/// store it bulk-inserts rows in one transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSupplier;

impl Supplier for UuidSupplier {
    fn supply(
        &self,
        _region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError> {
        let tokens: Vec<String> = (0..request.requested_size)
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        store.append(&tokens)?;
        Ok(SupplyReport::success(request.requested_size))
    }
}
