//! Logging initialisation for tests.
//!
//! Call [`init`] at the top of every test: the first call installs a
//! global subscriber, later calls are no-ops, so tests can run in any
//! order and in parallel.
//!
//! Verbosity is read from the `HOP_LOG` environment variable, falling
//! back to `RUST_LOG`, falling back to `info`.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_env("HOP_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .init();
    });
}
