use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tokenpool::Region;

/// The set of regions an operator manages, stored as one JSON document:
///
/// ```json
/// { "regions": [ { "machine_name": "serials", "store_kind": "line_file", ... } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRegistry {
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl RegionRegistry {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read region registry {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("invalid region registry {}", path.display()))
    }

    /// Writes the registry through a temp file and a rename, so a crash never
    /// leaves a half-written registry behind.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let temp_path = temp_path(path);

        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, machine_name: &str) -> anyhow::Result<&Region> {
        match self.regions.iter().find(|r| r.machine_name == machine_name) {
            Some(region) => Ok(region),
            None => bail!("no region named {machine_name:?} in the registry"),
        }
    }

    /// Clones `machine_name` as `new_machine_name` and adds the clone.
    pub fn clone_region(
        &mut self,
        machine_name: &str,
        new_machine_name: &str,
    ) -> anyhow::Result<&Region> {
        if self.get(new_machine_name).is_ok() {
            bail!("a region named {new_machine_name:?} already exists");
        }
        let clone = self.get(machine_name)?.clone_as(new_machine_name);
        self.regions.push(clone);
        Ok(&self.regions[self.regions.len() - 1])
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
