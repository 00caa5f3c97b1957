pub mod builders;
pub mod fake_collab;
pub mod recording_policy;

use std::sync::Once;
use std::time::Duration;

use clustersched::model::SessionEvent;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests or with `--nocapture`. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,clustersched=debug"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Fail the test if `f` has not finished within five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("engine did not respond within 5 seconds")
}

/// Everything already delivered on a session receiver, without waiting.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
