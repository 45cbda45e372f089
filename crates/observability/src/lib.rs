//! Process-wide logging setup shared by gatehouse binaries and tests.

/// Initialize tracing with the `RUST_LOG` filter (default `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing with `directive` unless `RUST_LOG` is set.
pub fn init_with_filter(directive: &str) {
    tracing::init_with_filter(directive);
}

/// Subscriber construction (filters, JSON formatting).
pub mod tracing;
