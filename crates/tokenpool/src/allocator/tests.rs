use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    thread::scope,
};

use tempfile::TempDir;

use crate::{
    Allocator, BackingStore, Error, InsufficientData, Region, RegionHandle, RuleContext,
    RuleError, RuleSpec, StoreKind, Supplier, SupplierError, SupplyReport, SupplyRequest,
    UuidSupplier,
};

/// Writes `T1, T2, ...` and counts how often it was called.
#[derive(Default)]
struct SerialSupplier {
    next: AtomicU64,
    calls: AtomicUsize,
}

impl Supplier for SerialSupplier {
    fn supply(
        &self,
        _region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let first = self.next.fetch_add(request.requested_size, Ordering::Relaxed) + 1;
        let tokens: Vec<String> = (first..first + request.requested_size)
            .map(|i| format!("T{i}"))
            .collect();
        store.append(&tokens)?;
        Ok(SupplyReport::success(request.requested_size))
    }
}

fn serials(range: core::ops::RangeInclusive<u64>) -> Vec<String> {
    range.map(|i| format!("T{i}")).collect()
}

fn region(dir: &TempDir, kind: StoreKind, batch: u64) -> Region {
    Region::new("serials", kind, dir.path().join("numbers"), batch)
}

fn store_kinds() -> Vec<StoreKind> {
    let mut kinds = vec![StoreKind::LineFile];
    if cfg!(feature = "row-store") {
        kinds.push(StoreKind::Row);
    }
    kinds
}

#[test]
fn first_allocation_replenishes_a_full_batch() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 200)).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    assert_eq!(allocator.allocate(&handle, 5).unwrap(), serials(1..=5));
    assert_eq!(handle.store().current_size().unwrap(), 200);
    assert_eq!(handle.cursor_snapshot().unwrap().last_position, 6);
    assert_eq!(allocator.supplier().calls.load(Ordering::Relaxed), 1);
}

#[test]
fn line_file_sequence_grows_store_in_batches() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 200)).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    let mut issued = Vec::new();
    let mut sizes = Vec::new();
    for count in [5, 10, 100, 150, 50] {
        issued.extend(allocator.allocate(&handle, count).unwrap());
        sizes.push(handle.store().current_size().unwrap());
    }

    assert_eq!(sizes, [200, 200, 200, 400, 400]);
    assert_eq!(issued, serials(1..=315));
    let cursor = handle.cursor_snapshot().unwrap();
    assert_eq!(cursor.last_position, 316);
    assert_eq!(cursor.issued, 315);
    assert_eq!(allocator.supplier().calls.load(Ordering::Relaxed), 2);
}

#[cfg(feature = "row-store")]
#[test]
fn row_sequence_consumes_rows() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::Row, 200)).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    let mut issued = Vec::new();
    let mut sizes = Vec::new();
    for count in [5, 10, 100, 150, 50] {
        issued.extend(allocator.allocate(&handle, count).unwrap());
        sizes.push(handle.store().current_size().unwrap());
    }

    assert_eq!(sizes, [195, 185, 85, 135, 85]);
    assert_eq!(issued, serials(1..=315));
    assert_eq!(handle.cursor_snapshot().unwrap().issued, 315);
}

#[test]
fn oversized_request_is_supplied_in_full() {
    for kind in store_kinds() {
        let dir = TempDir::new().unwrap();
        let handle = RegionHandle::open(region(&dir, kind, 200)).unwrap();
        let allocator = Allocator::new(SerialSupplier::default());

        assert_eq!(allocator.allocate(&handle, 450).unwrap(), serials(1..=450));
        assert_eq!(allocator.supplier().next.load(Ordering::Relaxed), 450);
    }
}

#[test]
fn concurrent_allocations_never_share_a_token() {
    for kind in store_kinds() {
        let dir = TempDir::new().unwrap();
        let handle = RegionHandle::open(region(&dir, kind, 1000)).unwrap();
        let allocator = Allocator::new(UuidSupplier);
        let first = allocator.allocate(&handle, 1).unwrap();

        let issued: Vec<String> = scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..10)
                            .flat_map(|_| allocator.allocate(&handle, 5).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .chain(first)
                .collect()
        });

        let unique: HashSet<_> = issued.iter().collect();
        assert_eq!(issued.len(), 401, "{kind:?}");
        assert_eq!(unique.len(), 401, "{kind:?}");
        assert_eq!(handle.cursor_snapshot().unwrap().issued, 401);
    }
}

#[test]
fn separate_handles_on_one_line_file_serialise_through_the_lock_file() {
    let dir = TempDir::new().unwrap();
    let region = region(&dir, StoreKind::LineFile, 1000);
    let allocator = Allocator::new(SerialSupplier::default());
    let a = RegionHandle::open(region.clone()).unwrap();
    let b = RegionHandle::open(region).unwrap();
    allocator.allocate(&a, 1).unwrap();

    let mut issued: Vec<String> = scope(|s| {
        let left = s.spawn(|| {
            (0..20)
                .flat_map(|_| allocator.allocate(&a, 3).unwrap())
                .collect::<Vec<_>>()
        });
        let right = s.spawn(|| {
            (0..20)
                .flat_map(|_| allocator.allocate(&b, 3).unwrap())
                .collect::<Vec<_>>()
        });
        let mut all = left.join().unwrap();
        all.extend(right.join().unwrap());
        all
    });

    issued.sort_by_key(|t| t[1..].parse::<u64>().unwrap());
    assert_eq!(issued, serials(2..=121));
}

#[test]
fn supplier_failure_issues_nothing() {
    for kind in store_kinds() {
        let dir = TempDir::new().unwrap();
        let handle = RegionHandle::open(region(&dir, kind, 10)).unwrap();
        let failing = Allocator::new(|_: &Region, _: &dyn BackingStore, _: &SupplyRequest| {
            Ok::<_, SupplierError>(SupplyReport::failure("upstream returned 503"))
        });

        let err = failing.allocate(&handle, 3).unwrap_err();
        assert!(err.is_supplier_failure(), "{kind:?}: {err}");
        assert_eq!(handle.store().current_size().unwrap(), 0);
        assert_eq!(handle.cursor_snapshot().unwrap(), Default::default());
    }
}

#[test]
fn short_supply_raises_insufficient_data_without_moving_cursor() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 10)).unwrap();
    let stingy = Allocator::new(|_: &Region, store: &dyn BackingStore, _: &SupplyRequest| {
        store.append(&["lonely".to_string()])?;
        Ok::<_, SupplierError>(SupplyReport::success(1))
    });

    let err = stingy.allocate(&handle, 5).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientData(InsufficientData::MissingLine { line: 2 })
    ));
    assert!(err.is_supply_exhausted());
    assert_eq!(handle.cursor_snapshot().unwrap().last_position, 1);
}

#[test]
fn huge_request_is_refused_and_the_handle_stays_usable() {
    for kind in store_kinds() {
        let dir = TempDir::new().unwrap();
        let handle = RegionHandle::open(region(&dir, kind, 10)).unwrap();
        let written = AtomicU64::new(0);
        let one_at_a_time =
            Allocator::new(|_: &Region, store: &dyn BackingStore, _: &SupplyRequest| {
                let n = written.fetch_add(1, Ordering::Relaxed) + 1;
                store.append(&[format!("T{n}")])?;
                Ok::<_, SupplierError>(SupplyReport::success(1))
            });

        let err = one_at_a_time.allocate(&handle, 1 << 60).unwrap_err();
        assert!(err.is_supply_exhausted(), "{kind:?}: {err:?}");

        assert_eq!(one_at_a_time.allocate(&handle, 1).unwrap(), ["T1"], "{kind:?}");
    }
}

#[cfg(feature = "row-store")]
#[test]
fn short_row_supply_deletes_nothing() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::Row, 10)).unwrap();
    let stingy = Allocator::new(|_: &Region, store: &dyn BackingStore, _: &SupplyRequest| {
        store.append(&["a".to_string(), "b".to_string()])?;
        Ok::<_, SupplierError>(SupplyReport::success(2))
    });

    let err = stingy.allocate(&handle, 5).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientData(InsufficientData::Shortfall {
            available: 2,
            requested: 5
        })
    ));
    assert_eq!(handle.store().current_size().unwrap(), 2);
}

#[test]
fn zero_allocation_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 200)).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    assert!(allocator.allocate(&handle, 0).unwrap().is_empty());
    assert_eq!(allocator.supplier().calls.load(Ordering::Relaxed), 0);
    assert_eq!(handle.store().current_size().unwrap(), 0);
    assert!(handle.store().kind() == StoreKind::LineFile);
    assert!(!handle.region().cursor_path().exists());
}

#[test]
fn pre_rules_refuse_before_replenishment() {
    let dir = TempDir::new().unwrap();
    let mut region = region(&dir, StoreKind::LineFile, 200);
    region.active = false;
    region.rules.pre = vec![RuleSpec::Active, RuleSpec::NoOddRequests];
    let handle = RegionHandle::open(region).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    for count in [0, 4] {
        let err = allocator.allocate(&handle, count).unwrap_err();
        assert!(matches!(err, Error::Rule(RuleError::Inactive { .. })));
    }
    assert_eq!(allocator.supplier().calls.load(Ordering::Relaxed), 0);
}

#[test]
fn odd_requests_are_refused_when_configured() {
    let dir = TempDir::new().unwrap();
    let mut region = region(&dir, StoreKind::LineFile, 200);
    region.rules.pre = vec![RuleSpec::NoOddRequests];
    let handle = RegionHandle::open(region).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());

    assert!(matches!(
        allocator.allocate(&handle, 3),
        Err(Error::Rule(RuleError::OddRequest { size: 3 }))
    ));
    assert_eq!(allocator.allocate(&handle, 2).unwrap(), serials(1..=2));
}

#[test]
fn post_rule_failure_keeps_tokens_issued() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 200))
        .unwrap()
        .with_post_rule(|ctx: &RuleContext<'_>| match ctx.tokens {
            Some(tokens) if tokens.contains(&"T3".to_string()) => Err(RuleError::Custom {
                rule: "no-t3".into(),
                reason: "T3 is reserved".into(),
            }),
            _ => Ok(()),
        });
    let allocator = Allocator::new(SerialSupplier::default());

    assert!(matches!(
        allocator.allocate(&handle, 5),
        Err(Error::Rule(RuleError::Custom { .. }))
    ));
    // at-most-once: the refused batch is not handed out again
    assert_eq!(allocator.allocate(&handle, 2).unwrap(), serials(6..=7));
}

#[test]
fn cursor_survives_reopening_the_region() {
    for kind in store_kinds() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir, kind, 20);
        let allocator = Allocator::new(SerialSupplier::default());

        {
            let handle = RegionHandle::open(region.clone()).unwrap();
            assert_eq!(allocator.allocate(&handle, 7).unwrap(), serials(1..=7));
        }

        let handle = RegionHandle::open(region).unwrap();
        assert_eq!(
            allocator.allocate(&handle, 3).unwrap(),
            serials(8..=10),
            "{kind:?}"
        );
        assert_eq!(handle.cursor_snapshot().unwrap().issued, 10);
    }
}

#[test]
fn cloned_region_starts_empty() {
    let dir = TempDir::new().unwrap();
    let original = region(&dir, StoreKind::LineFile, 20);
    let allocator = Allocator::new(SerialSupplier::default());
    let handle = RegionHandle::open(original.clone()).unwrap();
    allocator.allocate(&handle, 5).unwrap();

    let mut clone = original.clone_as("serials-copy");
    clone.active = true;
    let cloned = RegionHandle::open(clone).unwrap();

    let status = cloned.status().unwrap();
    assert_eq!(status.store_size, 0);
    assert_eq!(status.cursor.last_position, 1);
    assert_eq!(allocator.allocate(&cloned, 1).unwrap(), serials(21..=21));
}

#[test]
fn status_reports_supply() {
    let dir = TempDir::new().unwrap();
    let handle = RegionHandle::open(region(&dir, StoreKind::LineFile, 50)).unwrap();
    let allocator = Allocator::new(SerialSupplier::default());
    allocator.allocate(&handle, 12).unwrap();

    let status = handle.status().unwrap();
    assert_eq!(status.store_kind, StoreKind::LineFile);
    assert_eq!(status.store_size, 50);
    assert_eq!(status.cursor.last_position, 13);
    assert_eq!(status.available, 38);
}
