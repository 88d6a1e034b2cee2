pub mod builders;
pub mod fake_executor;
pub mod sink;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{ExecutionRequestBuilder, PipelineRequestBuilder, StepBuilder};
pub use fake_executor::{FakeOutcome, FakeStepExecutor, RecordedCall};
pub use sink::RecordingSink;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Allowlist used by process-spawning tests: short-lived Unix tools only.
pub fn test_tools() -> Vec<String> {
    ["echo", "sh", "sleep", "printenv", "pwd", "true", "false", "cat"]
        .into_iter()
        .map(String::from)
        .collect()
}
