// src/messaging/mod.rs

//! Message transport.
//!
//! Inbound messages reach the coordinator as a [`Delivery`] and leave it as a
//! [`Disposition`]; the transport applies the disposition. Outbound traffic
//! goes through the [`Messenger`] trait so the coordinator never depends on the
//! broker client directly.

use std::fmt::Debug;

use futures::future::BoxFuture;

use crate::errors::Result;
use crate::model::messages::UPDATES_KEY;
use crate::model::UpdateMessage;

pub mod amqp;
pub mod dispatch;

pub use amqp::AmqpClient;
pub use dispatch::{Acknowledger, Dispatcher};

/// An inbound message with the delivery metadata the coordinator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Set by the broker when this message was handed out before.
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>, redelivered: bool) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
            redelivered,
        }
    }
}

/// What to do with a delivery once it has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

impl Disposition {
    /// Reject, asking for one more attempt unless this was already it.
    pub fn retry_unless_redelivered(redelivered: bool) -> Self {
        Disposition::Reject {
            requeue: !redelivered,
        }
    }
}

/// The consumer a delivery arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Launches,
    Stops,
    Events,
}

impl Route {
    /// Event deliveries are acknowledged before they are dispatched.
    pub fn acks_before_dispatch(self) -> bool {
        matches!(self, Route::Events)
    }
}

pub trait Messenger: Send + Sync + Debug {
    /// Publish `body` on the launcher exchange under `routing_key`.
    fn publish<'a>(&'a self, routing_key: &'a str, body: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Delete a queue. Deleting a queue that does not exist is not an error.
    fn delete_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Publish a status update on the updates key.
    fn publish_job_update<'a>(&'a self, update: &'a UpdateMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = serde_json::to_vec(update)?;
            self.publish(UPDATES_KEY, &body).await
        })
    }
}

/// Something that decides the fate of deliveries.
pub trait DeliveryHandler: Send + Sync + Debug {
    fn handle<'a>(&'a self, route: Route, delivery: &'a Delivery) -> BoxFuture<'a, Disposition>;
}
