//! Shared logger bootstrap for the binaries.

use env_logger::{Builder, Env};

/// Install the global logger once, honouring `RUST_LOG` when it is set.
///
/// `default_level` applies only when the environment does not choose a filter.
/// Repeated calls are ignored so tests and binaries can both call it.
pub fn init(default_level: &str) {
    let env = Env::default().default_filter_or(default_level);
    let _ = Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
