// src/messaging/dispatch.rs

//! Running handlers for inbound deliveries.
//!
//! Every delivery is handled in its own task. The tasks are tracked so a
//! consumer can wait for the ones still running before its channel goes away;
//! a launch that has reached `condor_submit` must still be settled, or the
//! broker hands it out again and the job is submitted twice.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, Instrument};

use crate::errors::Result;
use crate::messaging::{Delivery, DeliveryHandler, Disposition, Route};

/// Settles one delivery with the broker.
pub trait Acknowledger: Send + Sync + 'static {
    fn settle(&self, disposition: Disposition) -> BoxFuture<'_, Result<()>>;
}

/// Run `handler` for `delivery` and settle it through `acker`.
///
/// Event deliveries are acknowledged before the handler runs; everything else
/// is settled with the disposition the handler returns.
pub async fn dispatch<A: Acknowledger>(
    route: Route,
    delivery: Delivery,
    acker: A,
    handler: Arc<dyn DeliveryHandler>,
) {
    if route.acks_before_dispatch() {
        if let Err(err) = acker.settle(Disposition::Ack).await {
            error!(error = %err, routing_key = %delivery.routing_key, "ack failed");
        }
        handler.handle(route, &delivery).await;
        return;
    }

    let disposition = handler.handle(route, &delivery).await;
    if let Err(err) = acker.settle(disposition).await {
        error!(
            error = %err,
            routing_key = %delivery.routing_key,
            ?disposition,
            "settling delivery failed"
        );
    }
}

/// Spawns [`dispatch`] tasks and keeps track of them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handler: Arc<dyn DeliveryHandler>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn DeliveryHandler>) -> Self {
        Self {
            handler,
            tracker: TaskTracker::new(),
        }
    }

    pub fn spawn<A: Acknowledger>(&self, route: Route, delivery: Delivery, acker: A) {
        let handler = Arc::clone(&self.handler);
        self.tracker
            .spawn(dispatch(route, delivery, acker, handler).in_current_span());
    }

    /// Handlers that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait until every spawned handler has settled
    /// its delivery.
    pub async fn drain(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            debug!(in_flight = self.tracker.len(), "waiting for in-flight deliveries");
        }
        self.tracker.wait().await;
    }
}
