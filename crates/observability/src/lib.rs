//! Structured logging setup shared by the engine's binaries.

/// Tracing subscriber installation (filters, JSON output).
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, init, init_with_filter};
