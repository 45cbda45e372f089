//! Tracing/logging initialization.
//!
//! Events are written as JSON lines with timestamps. `RUST_LOG` always wins
//! over the programmatic default.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "info";

pub fn init() {
    init_with_filter(DEFAULT_DIRECTIVE);
}

pub fn init_with_filter(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_with_filter("debug");
        init();
        ::tracing::info!(component = "observability", "still logging");
    }
}
