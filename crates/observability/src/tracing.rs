//! Tracing/logging initialization.
//!
//! JSON lines on stdout with timestamps. The filter comes from `RUST_LOG`
//! unless the caller passes a configured directive.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Like [`init`], but with an explicit filter directive (e.g. `karat=debug`).
///
/// An unparsable directive falls back to [`DEFAULT_FILTER`] and is reported
/// once the subscriber is up.
pub fn init_with_filter(directive: &str) {
    match EnvFilter::try_new(directive) {
        Ok(filter) => install(filter),
        Err(err) => {
            install(EnvFilter::new(DEFAULT_FILTER));
            ::tracing::warn!(%directive, error = %err, "invalid log filter, using default");
        }
    }
}

fn install(filter: EnvFilter) {
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
        init_with_filter("karat=debug");
        init();
        init_with_filter("not a [valid filter");
    }
}
