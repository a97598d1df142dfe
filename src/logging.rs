//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, StoreError};

/// Installs a global `fmt` subscriber filtered by `level`, which accepts any
/// `EnvFilter` directive such as `"info"` or `"gridstore::storage=debug"`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|_| StoreError::IllegalArgument("invalid log filter"))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| StoreError::IllegalArgument("logging already initialized"))
}
