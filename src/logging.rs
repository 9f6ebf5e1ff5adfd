//! Diagnostic logging setup.
//!
//! Strictly for `stderr` diagnostics around launch/reap/signal bookkeeping —
//! never a substitute for the shell's fixed, user-visible output formats.
//! Default level is `warn` so an interactive shell stays quiet unless the
//! user opts in with `RUST_LOG`, matching how a CLI tool like this should
//! behave out of the box.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
