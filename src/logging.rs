//! # Logging
//!
//! Console logging via the tracing ecosystem, designed for containerized
//! deployments where logs go to stdout. Level configuration comes from
//! `RUST_LOG` with a sensible default; ANSI colors only when stdout is a
//! TTY.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the global subscriber. Idempotent so tests and the binary can
/// both call it.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,persondata_sync_client=debug"));

        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_ansi(std::io::stdout().is_terminal());

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    });
}
