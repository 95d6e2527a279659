use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{rand::random_name, rules::RuleSet, store::StoreKind, supply::ReplenishmentPolicy};

/// Directory used for stores when a region does not name one.
pub const DEFAULT_STORE_DIRECTORY: &str = "/var/tokenpool/numbers";

/// Static configuration of a single allocation sequence.
///
/// A region owns exactly one backing store, located at
/// `directory/store_id` (see [`Region::store_path`]). The mutable part of a
/// region, its cursor, lives next to the store in a separate file and is only
/// touched by the allocator.
///
/// # Example
///
/// ```
/// use tokenpool::{Region, StoreKind};
///
/// let region = Region::new("serials", StoreKind::LineFile, "/tmp/numbers", 500);
/// assert!(region.store_path().starts_with("/tmp/numbers"));
/// assert!(region.active);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Unique, human-meaningful name of the region.
    pub machine_name: String,
    /// Inactive regions are refused by the [`crate::RuleSpec::Active`] rule.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Which backing store variant holds the tokens.
    pub store_kind: StoreKind,
    /// Directory holding the store, its cursor and its lock file.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Random identifier naming the store within `directory`.
    pub store_id: String,
    /// Batch size requested from the supplier when supply runs low.
    pub replenishment_size: u64,
    /// How the replenishment amount is derived from the shortfall.
    #[serde(default)]
    pub replenishment_policy: ReplenishmentPolicy,
    /// Pre- and post-processing rules attached to this region.
    #[serde(default)]
    pub rules: RuleSet,
    /// Free-form key-value parameters handed to the supplier.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_active() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_DIRECTORY)
}

impl Region {
    /// Creates an active region with a freshly generated store identifier,
    /// the default replenishment policy, no rules and no parameters.
    pub fn new(
        machine_name: impl Into<String>,
        store_kind: StoreKind,
        directory: impl Into<PathBuf>,
        replenishment_size: u64,
    ) -> Self {
        Self {
            machine_name: machine_name.into(),
            active: true,
            store_kind,
            directory: directory.into(),
            store_id: random_name(),
            replenishment_size,
            replenishment_policy: ReplenishmentPolicy::default(),
            rules: RuleSet::default(),
            parameters: BTreeMap::new(),
        }
    }

    /// Path of the backing store.
    ///
    /// Line-file stores live at `directory/store_id`; row stores at
    /// `directory/store_id.db`.
    pub fn store_path(&self) -> PathBuf {
        match self.store_kind {
            StoreKind::LineFile => self.directory.join(&self.store_id),
            StoreKind::Row => self.sibling("db"),
        }
    }

    /// Path of the persisted [`crate::RegionCursor`].
    pub fn cursor_path(&self) -> PathBuf {
        self.sibling("cursor")
    }

    /// Path of the advisory lock file guarding the allocation critical
    /// section across processes.
    pub fn lock_path(&self) -> PathBuf {
        self.sibling("lock")
    }

    /// Name of the row-store table, derived from the store identifier.
    pub fn table_name(&self) -> String {
        format!("REGION_{}", self.store_id)
    }

    /// The directory holding every file of this region.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Clones this region under a new machine name.
    ///
    /// The clone gets a fresh store identifier (and therefore an empty store
    /// and a cursor at line 1), starts inactive, and has every parameter whose
    /// value was the old machine name rewritten to the new one.
    pub fn clone_as(&self, new_machine_name: impl Into<String>) -> Self {
        let new_machine_name = new_machine_name.into();
        let parameters = self
            .parameters
            .iter()
            .map(|(key, value)| {
                let value = if *value == self.machine_name {
                    new_machine_name.clone()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect();

        Self {
            machine_name: new_machine_name,
            active: false,
            store_id: random_name(),
            parameters,
            ..self.clone()
        }
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{extension}", self.store_id))
    }
}
