use std::io::{self, IsTerminal};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// Level filtering comes from `RUST_LOG`, defaulting to `info`. Records go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
