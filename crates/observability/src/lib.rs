//! Tracing and logging setup shared by every erpguard process.

/// Initialize process-wide tracing for `config`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::{LogConfig, LogFormat, LogFormatError};
