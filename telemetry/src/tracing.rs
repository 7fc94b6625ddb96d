use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default log level applied when `RUST_LOG` is unset.
const DEFAULT_LEVEL: Level = Level::INFO;

/// Initializes tracing for a binary.
///
/// Respects `RUST_LOG` for per-target filtering and falls back to `info` level.
/// Must be called before the async runtime starts so that early connection
/// errors are captured.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    tracing::info!(service = service_name, "tracing initialized");
}

/// Initializes tracing for tests.
///
/// Uses a relaxed initialization that tolerates being called from multiple
/// tests in the same process, and writes through the test writer so output is
/// captured per test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
