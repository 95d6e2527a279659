use std::{path::PathBuf, time::Duration};

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments of the `tokenpool` binary.
///
/// Every global option can also be set through the environment (or a `.env`
/// file in the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenpool",
    version,
    about = "Allocate tokens from replenishable regions"
)]
pub struct CliArgs {
    /// Region registry: a JSON document listing every region.
    ///
    /// Environment variable: `TOKENPOOL_REGIONS`
    #[arg(long, env = "TOKENPOOL_REGIONS", default_value = "regions.json", global = true)]
    pub regions: PathBuf,

    /// Where new tokens come from when a region runs short.
    ///
    /// `uuid` generates random UUIDs in-process; `command` runs
    /// `--supplier-command` and reads one token per line from its stdout.
    ///
    /// Environment variable: `TOKENPOOL_SUPPLIER`
    #[arg(long, env = "TOKENPOOL_SUPPLIER", value_enum, default_value_t = SupplierKind::Uuid, global = true)]
    pub supplier: SupplierKind,

    /// Shell command run by the `command` supplier.
    ///
    /// The supply request is passed in `TOKENPOOL_*` environment variables,
    /// region parameters as `TOKENPOOL_PARAM_<KEY>`.
    ///
    /// Environment variable: `TOKENPOOL_SUPPLIER_COMMAND`
    #[arg(long, env = "TOKENPOOL_SUPPLIER_COMMAND", global = true)]
    pub supplier_command: Option<String>,

    /// Seconds the `command` supplier may run before it is killed.
    ///
    /// Environment variable: `TOKENPOOL_SUPPLIER_TIMEOUT_SECS`
    #[arg(long, env = "TOKENPOOL_SUPPLIER_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub supplier_timeout_secs: u64,

    /// Log output format (logs go to stderr).
    ///
    /// Environment variable: `TOKENPOOL_LOG_FORMAT`
    #[arg(long, env = "TOKENPOOL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Allocate tokens and print them, one per line.
    Allocate {
        /// Machine name of the region.
        region: String,
        /// Number of tokens to allocate.
        size: u64,
    },
    /// Show store size, cursor and available supply of a region.
    Status {
        /// Machine name of the region.
        region: String,
    },
    /// Create the region's store if it does not exist.
    Init {
        /// Machine name of the region.
        region: String,
    },
    /// Clone a region under a new machine name and add it to the registry.
    ///
    /// The clone gets its own, empty store and starts inactive.
    Clone {
        /// Machine name of the region to clone.
        region: String,
        /// Machine name of the clone.
        new_machine_name: String,
    },
    /// List the regions in the registry.
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierKind {
    Uuid,
    Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Which supplier replenishes regions, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierConfig {
    Uuid,
    Command { command: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub regions: PathBuf,
    pub supplier: SupplierConfig,
    pub log_format: LogFormat,
    pub command: Command,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.supplier_timeout_secs == 0 {
            bail!("TOKENPOOL_SUPPLIER_TIMEOUT_SECS must be greater than 0");
        }

        let supplier = match (args.supplier, args.supplier_command) {
            (SupplierKind::Uuid, _) => SupplierConfig::Uuid,
            (SupplierKind::Command, Some(command)) if !command.trim().is_empty() => {
                SupplierConfig::Command {
                    command,
                    timeout: Duration::from_secs(args.supplier_timeout_secs),
                }
            }
            (SupplierKind::Command, _) => {
                bail!("TOKENPOOL_SUPPLIER_COMMAND is required when the supplier is `command`")
            }
        };

        Ok(Self {
            regions: args.regions,
            supplier,
            log_format: args.log_format,
            command: args.command,
        })
    }
}
