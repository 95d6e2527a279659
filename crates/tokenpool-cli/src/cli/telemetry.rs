//! Log output for the CLI.
//!
//! Tokens are printed on stdout, so every log line goes to stderr. Verbosity
//! follows `RUST_LOG` (default `info`), e.g.:
//!
//! ```bash
//! RUST_LOG=tokenpool=debug tokenpool allocate serials 10
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::LogFormat;

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_ids(true)
                    .with_target(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
            )
            .try_init()?,
    }
    Ok(())
}
