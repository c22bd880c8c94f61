//! Logging initialization.
//!
//! Diagnostics go to stderr through `tracing`; stdout stays reserved for
//! results (run summaries, dry-run plans, the doctor report). The level
//! defaults to `info`, `-v` raises it to `debug`, and `RUST_LOG` wins
//! over both.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}
