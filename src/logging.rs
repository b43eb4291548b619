//! Log output for modules.
//!
//! stdout carries packets, so logs go to stderr. The filter is read from
//! `TIMOD_LOG` using the usual `EnvFilter` syntax (`debug`,
//! `timod=trace,info`, ...) and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TIMOD_LOG";

/// Install a stderr subscriber as the global default.
///
/// Returns `false` if a global subscriber was already set, in which case
/// the existing one stays in place.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
