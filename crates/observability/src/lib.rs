//! Tracing, logging and audit output (shared setup).

pub mod audit;
pub mod logging;

pub use audit::{AUDIT_TARGET, TracingAuditSink};
pub use logging::LogFormat;

/// Initialize process-wide logging with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init_with("info", LogFormat::Json);
}
