use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tokenpool::{
    BackingStore, Region, Supplier, SupplierError, SupplyReport, SupplyRequest, UuidSupplier,
};

use super::config::SupplierConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs an external program to manufacture tokens.
///
/// The program is started through `sh -c` with the supply request in its
/// environment:
///
/// - `TOKENPOOL_REGION`: machine name of the region
/// - `TOKENPOOL_SIZE`: number of tokens wanted
/// - `TOKENPOOL_CORRELATION_ID`, `TOKENPOOL_TIMESTAMP`,
///   `TOKENPOOL_RANDOM_NUMBER`: the request's identity
/// - `TOKENPOOL_PARAM_<KEY>`: every region parameter, key upper-cased
///
/// It must print one token per line on stdout and exit with status 0. The
/// supplier, not the program, appends the tokens to the store.
#[derive(Debug, Clone)]
pub struct CommandSupplier {
    command: String,
    timeout: Duration,
}

impl CommandSupplier {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn spawn(&self, region: &Region, request: &SupplyRequest) -> std::io::Result<Child> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env("TOKENPOOL_REGION", &region.machine_name)
            .env("TOKENPOOL_SIZE", request.requested_size.to_string())
            .env("TOKENPOOL_CORRELATION_ID", &request.correlation_id)
            .env("TOKENPOOL_TIMESTAMP", request.timestamp_millis.to_string())
            .env("TOKENPOOL_RANDOM_NUMBER", request.random_number.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Own process group, so a timeout also reaches whatever the shell
        // started in the background.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        for (key, value) in &region.parameters {
            command.env(format!("TOKENPOOL_PARAM_{}", env_key(key)), value);
        }
        command.spawn()
    }
}

impl Supplier for CommandSupplier {
    fn supply(
        &self,
        region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError> {
        let mut child = self.spawn(region, request)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or("supplier command has no stdout")?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                kill_tree(&mut child);
                return Err(format!(
                    "supplier command timed out after {}s",
                    self.timeout.as_secs_f64()
                )
                .into());
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = reader
            .join()
            .map_err(|_| "supplier output reader panicked")??;
        if !status.success() {
            tracing::warn!(correlation_id = %request.correlation_id, %status, "supplier command failed");
            return Ok(SupplyReport::failure(format!(
                "supplier command exited with {status}"
            )));
        }

        let tokens: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        store.append(&tokens)?;
        tracing::info!(
            correlation_id = %request.correlation_id,
            written = tokens.len(),
            "supplier command delivered tokens"
        );
        Ok(SupplyReport::success(tokens.len() as u64))
    }
}

/// Kills the child and its process group. Both are best effort: the child may
/// have exited in the meantime.
///
/// The stdout reader thread is left to finish on its own; it ends once every
/// process holding the pipe is gone.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Upper-cases `key` and replaces anything that is not `[A-Z0-9_]`.
fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| match c.to_ascii_uppercase() {
            c @ ('A'..='Z' | '0'..='9') => c,
            _ => '_',
        })
        .collect()
}

/// The supplier selected on the command line.
#[derive(Debug, Clone)]
pub enum CliSupplier {
    Uuid(UuidSupplier),
    Command(CommandSupplier),
}

impl From<&SupplierConfig> for CliSupplier {
    fn from(config: &SupplierConfig) -> Self {
        match config {
            SupplierConfig::Uuid => Self::Uuid(UuidSupplier),
            SupplierConfig::Command { command, timeout } => {
                Self::Command(CommandSupplier::new(command.clone(), *timeout))
            }
        }
    }
}

impl Supplier for CliSupplier {
    fn supply(
        &self,
        region: &Region,
        store: &dyn BackingStore,
        request: &SupplyRequest,
    ) -> Result<SupplyReport, SupplierError> {
        match self {
            Self::Uuid(supplier) => supplier.supply(region, store, request),
            Self::Command(supplier) => supplier.supply(region, store, request),
        }
    }
}
