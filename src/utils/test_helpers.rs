use std::sync::Once;

static LOGGING_INIT: Once = Once::new();

/// Installs a tracing subscriber that writes through the test harness.
///
/// Tests run in parallel and the global subscriber can only be set once, so
/// the call is guarded by a `Once`. Call this at the start of any test that
/// should emit readable log output under `RUST_LOG`.
pub fn setup_test_logging() {
    LOGGING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init() // Another crate in the test binary may have installed one already.
            .ok();
    });
}
