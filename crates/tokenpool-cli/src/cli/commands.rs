use std::io::Write;

use anyhow::Context;
use tokenpool::{Allocator, BackingStore, RegionHandle, StoreKind};

use super::{
    config::{CliConfig, Command},
    registry::RegionRegistry,
    supplier::CliSupplier,
};

/// Executes the configured subcommand, writing its output to `out`.
pub fn run(config: &CliConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match &config.command {
        Command::Allocate { region, size } => allocate(config, region, *size, out),
        Command::Status { region } => status(config, region, out),
        Command::Init { region } => init(config, region),
        Command::Clone {
            region,
            new_machine_name,
        } => clone(config, region, new_machine_name, out),
        Command::List => list(config, out),
    }
}

fn open(config: &CliConfig, machine_name: &str) -> anyhow::Result<RegionHandle> {
    let registry = RegionRegistry::load(&config.regions)?;
    let region = registry.get(machine_name)?.clone();
    RegionHandle::open(region).with_context(|| format!("failed to open region {machine_name:?}"))
}

fn allocate(
    config: &CliConfig,
    machine_name: &str,
    size: u64,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let handle = open(config, machine_name)?;
    let allocator = Allocator::new(CliSupplier::from(&config.supplier));

    let tokens = match allocator.allocate(&handle, size) {
        Ok(tokens) => tokens,
        Err(e) => {
            let kind = if e.is_supply_exhausted() {
                "out of supply"
            } else if e.is_supplier_failure() {
                "supplier unavailable"
            } else if e.is_storage_failure() {
                "storage failure"
            } else {
                "refused"
            };
            tracing::error!(region = machine_name, size, error = %e, "{kind}");
            return Err(e).with_context(|| format!("allocation from {machine_name:?} failed: {kind}"));
        }
    };

    for token in &tokens {
        writeln!(out, "{token}")?;
    }
    tracing::info!(region = machine_name, issued = tokens.len(), "allocation complete");
    Ok(())
}

fn status(config: &CliConfig, machine_name: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let handle = open(config, machine_name)?;
    let status = handle.status()?;
    let region = handle.region();

    writeln!(out, "region:      {}", region.machine_name)?;
    writeln!(out, "active:      {}", region.active)?;
    writeln!(out, "store:       {}", kind_name(status.store_kind))?;
    writeln!(out, "path:        {}", region.store_path().display())?;
    writeln!(out, "store size:  {}", status.store_size)?;
    if status.store_kind == StoreKind::LineFile {
        writeln!(out, "next line:   {}", status.cursor.last_position)?;
    }
    writeln!(out, "issued:      {}", status.cursor.issued)?;
    writeln!(out, "available:   {}", status.available)?;
    Ok(())
}

fn init(config: &CliConfig, machine_name: &str) -> anyhow::Result<()> {
    let handle = open(config, machine_name)?;
    handle.store().ensure_exists()?;
    tracing::info!(
        region = machine_name,
        path = %handle.region().store_path().display(),
        "store ready"
    );
    Ok(())
}

fn clone(
    config: &CliConfig,
    machine_name: &str,
    new_machine_name: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut registry = RegionRegistry::load(&config.regions)?;
    let store_id = registry
        .clone_region(machine_name, new_machine_name)?
        .store_id
        .clone();
    registry.save(&config.regions)?;

    tracing::info!(from = machine_name, to = new_machine_name, %store_id, "region cloned");
    writeln!(out, "{new_machine_name} {store_id}")?;
    Ok(())
}

fn list(config: &CliConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let registry = RegionRegistry::load(&config.regions)?;
    for region in &registry.regions {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            region.machine_name,
            kind_name(region.store_kind),
            if region.active { "active" } else { "inactive" },
            region.replenishment_size,
        )?;
    }
    Ok(())
}

fn kind_name(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::LineFile => "line_file",
        StoreKind::Row => "row",
    }
}
