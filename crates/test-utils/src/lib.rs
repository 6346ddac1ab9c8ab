pub mod builders;
pub mod fakes;

use std::sync::{Arc, Once};

use condor_launcher::config::ConfigFile;
use condor_launcher::engine::Coordinator;
use condor_launcher::fs::mock::MockFileSystem;
use condor_launcher::submit::{Builders, Templates};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fakes::{RecordingCredentials, RecordingMessenger, ScriptedScheduler};

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
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A coordinator wired to in-memory doubles, with handles on each of them.
pub struct Harness {
    pub cfg: Arc<ConfigFile>,
    pub coordinator: Arc<Coordinator>,
    pub messenger: Arc<RecordingMessenger>,
    pub scheduler: Arc<ScriptedScheduler>,
    pub credentials: Arc<RecordingCredentials>,
    pub fs: MockFileSystem,
}

impl Harness {
    pub fn new(cfg: ConfigFile) -> Self {
        let cfg = Arc::new(cfg);
        let messenger = RecordingMessenger::new();
        let scheduler = ScriptedScheduler::new();
        let credentials = RecordingCredentials::new();
        let fs = MockFileSystem::new();

        let templates = Arc::new(Templates::new().expect("templates compile"));
        let builders = Builders::new(
            Arc::clone(&cfg),
            templates,
            Arc::new(fs.clone()),
            credentials.clone(),
        );
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&cfg),
            messenger.clone(),
            scheduler.clone(),
            Arc::new(fs.clone()),
            builders,
        ));

        Self {
            cfg,
            coordinator,
            messenger,
            scheduler,
            credentials,
            fs,
        }
    }
}
