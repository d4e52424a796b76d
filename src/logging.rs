//! Logging configuration using tracing
//!
//! Provides structured logging to stderr with support for the RUST_LOG
//! environment variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Filtering is controlled via RUST_LOG (defaults to "warn" for quiet CLI
/// output).
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=aeromed=debug` - Debug level for the aeromed crate only
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init() -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .pretty(),
        )
        .try_init()
        .map_err(|e| crate::AeromedError::Config(format!("failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        // Can be called repeatedly without panicking
        init_test();
        init_test();
    }
}
