//! `tracing` subscriber bootstrap.
//!
//! Library code only emits events; a host binary calls [`init_logging`] once.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "BRANCHWATCH_LOG";

/// Installs a stderr `fmt` subscriber.
///
/// The filter comes from `BRANCHWATCH_LOG`, then `RUST_LOG`, then
/// `default_filter`. Returns `false` if a global subscriber was already set.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
