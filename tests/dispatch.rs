// tests/dispatch.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use condor_launcher::messaging::{Delivery, DeliveryHandler, Dispatcher, Disposition, Route};
use condor_launcher::model::messages::{LAUNCHES_KEY, PING_KEY};
use condor_launcher_test_utils::builders::{ConfigFileBuilder, JobBuilder};
use condor_launcher_test_utils::fakes::RecordingAcker;
use condor_launcher_test_utils::{init_tracing, with_timeout, Harness};
use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn launch_delivery(invocation_id: &str) -> Delivery {
    let job = JobBuilder::new(invocation_id).build();
    let body = serde_json::to_vec(&json!({ "job": job, "command": "LAUNCH" })).unwrap();
    Delivery::new(LAUNCHES_KEY, body, false)
}

/// Records how many settlements its acker had seen each time it was called.
#[derive(Debug)]
struct AckerWatcher {
    acker: RecordingAcker,
    seen: Mutex<Vec<usize>>,
}

impl DeliveryHandler for AckerWatcher {
    fn handle<'a>(&'a self, _route: Route, _delivery: &'a Delivery) -> BoxFuture<'a, Disposition> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(self.acker.settled().len());
            Disposition::Reject { requeue: true }
        })
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_a_submit_in_flight() -> TestResult {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new("/condor/logs").build());
    h.scheduler.submit_returns("42");
    h.scheduler.submit_delay(Duration::from_secs(30));

    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(h.coordinator.clone());
    let acker = RecordingAcker::new();
    dispatcher.spawn(Route::Launches, launch_delivery("U1"), acker.clone());
    assert_eq!(dispatcher.in_flight(), 1);

    // Same order as a consumer task: stop on cancellation, then drain.
    let consumer = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            dispatcher.drain().await;
        }
    });
    shutdown.cancel();
    consumer.await?;

    assert_eq!(acker.settled(), vec![Disposition::Ack]);
    assert_eq!(h.scheduler.submitted().len(), 1);
    assert_eq!(h.messenger.updates()[0]["status"], "Submitted");
    assert_eq!(dispatcher.in_flight(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drain_covers_every_delivery_started() -> TestResult {
    init_tracing();
    let h = Harness::new(ConfigFileBuilder::new("/condor/logs").build());
    h.scheduler.submit_delay(Duration::from_secs(5));

    let dispatcher = Dispatcher::new(h.coordinator.clone());
    let ackers: Vec<RecordingAcker> = (0..3).map(|_| RecordingAcker::new()).collect();
    for (i, acker) in ackers.iter().enumerate() {
        dispatcher.spawn(Route::Launches, launch_delivery(&format!("U{i}")), acker.clone());
    }
    assert_eq!(dispatcher.in_flight(), 3);

    dispatcher.drain().await;

    for acker in &ackers {
        assert_eq!(acker.settled(), vec![Disposition::Ack]);
    }
    assert_eq!(h.scheduler.submitted().len(), 3);
    Ok(())
}

#[tokio::test]
async fn events_are_acknowledged_before_the_handler_runs() -> TestResult {
    let acker = RecordingAcker::new();
    let watcher = Arc::new(AckerWatcher {
        acker: acker.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let dispatcher = Dispatcher::new(watcher.clone());

    dispatcher.spawn(Route::Events, Delivery::new(PING_KEY, b"{}".to_vec(), false), acker.clone());
    with_timeout(dispatcher.drain()).await;

    assert_eq!(*watcher.seen.lock().unwrap(), vec![1]);
    assert_eq!(acker.settled(), vec![Disposition::Ack]);
    Ok(())
}

#[tokio::test]
async fn other_routes_are_settled_with_the_handler_disposition() -> TestResult {
    let acker = RecordingAcker::new();
    let watcher = Arc::new(AckerWatcher {
        acker: acker.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let dispatcher = Dispatcher::new(watcher.clone());

    dispatcher.spawn(Route::Stops, Delivery::new("jobs.stops.X", b"{}".to_vec(), false), acker.clone());
    with_timeout(dispatcher.drain()).await;

    assert_eq!(*watcher.seen.lock().unwrap(), vec![0]);
    assert_eq!(acker.settled(), vec![Disposition::Reject { requeue: true }]);
    Ok(())
}

#[tokio::test]
async fn draining_an_idle_dispatcher_returns_at_once() {
    let h = Harness::new(ConfigFileBuilder::new("/condor/logs").build());
    let dispatcher = Dispatcher::new(h.coordinator.clone());

    with_timeout(dispatcher.drain()).await;

    assert_eq!(dispatcher.in_flight(), 0);
}
