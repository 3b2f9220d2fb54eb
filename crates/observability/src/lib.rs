//! Shared tracing/logging setup for ledger processes.

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Initialize process-wide tracing and logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
