// src/messaging/amqp.rs

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    QueueDeleteOptions,
};
use lapin::acker::Acker;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::AmqpSection;
use crate::errors::Result;
use crate::messaging::{
    Acknowledger, Delivery, DeliveryHandler, Dispatcher, Disposition, Messenger, Route,
};
use crate::model::messages::{
    EVENTS_BINDING_KEY, EVENTS_QUEUE, LAUNCHES_KEY, LAUNCHES_QUEUE, STOPS_BINDING_KEY, STOPS_QUEUE,
};

/// A durable queue bound to the launcher exchange, and the route its
/// deliveries take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerBinding {
    pub queue: &'static str,
    pub binding_key: &'static str,
    pub route: Route,
}

/// The three consumers the launcher runs.
pub const LAUNCHER_CONSUMERS: [ConsumerBinding; 3] = [
    ConsumerBinding {
        queue: LAUNCHES_QUEUE,
        binding_key: LAUNCHES_KEY,
        route: Route::Launches,
    },
    ConsumerBinding {
        queue: STOPS_QUEUE,
        binding_key: STOPS_BINDING_KEY,
        route: Route::Stops,
    },
    ConsumerBinding {
        queue: EVENTS_QUEUE,
        binding_key: EVENTS_BINDING_KEY,
        route: Route::Events,
    },
];

pub fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// Broker client: one connection, one channel for publishing and one channel
/// per consumer.
pub struct AmqpClient {
    connection: Connection,
    publisher: Channel,
    exchange: String,
    exchange_kind: ExchangeKind,
    prefetch: u16,
}

impl fmt::Debug for AmqpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpClient")
            .field("exchange", &self.exchange)
            .field("prefetch", &self.prefetch)
            .finish_non_exhaustive()
    }
}

impl AmqpClient {
    /// Connect and declare the exchange.
    pub async fn connect(cfg: &AmqpSection) -> Result<Self> {
        let connection = Connection::connect(&cfg.uri, ConnectionProperties::default()).await?;
        let publisher = connection.create_channel().await?;
        let exchange_kind = exchange_kind(&cfg.exchange.kind);

        publisher
            .exchange_declare(
                &cfg.exchange.name,
                exchange_kind.clone(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(exchange = %cfg.exchange.name, kind = %cfg.exchange.kind, "connected to broker");
        Ok(Self {
            connection,
            publisher,
            exchange: cfg.exchange.name.clone(),
            exchange_kind,
            prefetch: cfg.prefetch,
        })
    }

    async fn consumer_channel(&self, binding: ConsumerBinding) -> Result<Channel> {
        let channel = self.connection.create_channel().await?;
        if self.prefetch > 0 {
            channel
                .basic_qos(self.prefetch, BasicQosOptions::default())
                .await?;
        }
        channel
            .exchange_declare(
                &self.exchange,
                self.exchange_kind.clone(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                binding.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                binding.queue,
                &self.exchange,
                binding.binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    /// Declare and bind `binding.queue`, then hand every delivery to `handler` in
    /// its own task until `shutdown` is cancelled or the broker closes the
    /// stream. The returned task finishes only after every handler it started
    /// has settled its delivery.
    pub async fn consume(
        &self,
        binding: ConsumerBinding,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let channel = self.consumer_channel(binding).await?;
        let mut consumer = channel
            .basic_consume(
                binding.queue,
                &format!("condor-launcher-{}", binding.queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = binding.queue, binding_key = binding.binding_key, "consumer started");

        let dispatcher = Dispatcher::new(handler);
        let span = tracing::info_span!("consumer", queue = binding.queue);
        let task = async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    next = consumer.next() => next,
                };
                match next {
                    Some(Ok(delivery)) => {
                        let inbound = Delivery::new(
                            delivery.routing_key.as_str(),
                            delivery.data,
                            delivery.redelivered,
                        );
                        dispatcher.spawn(binding.route, inbound, delivery.acker);
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "consumer stream failed");
                        break;
                    }
                    None => {
                        warn!("consumer stream closed by broker");
                        break;
                    }
                }
            }
            // Acks go out on this channel, so it outlives every handler.
            dispatcher.drain().await;
            drop(channel);
            info!("consumer stopped");
        };
        Ok(tokio::spawn(task.instrument(span)))
    }

    pub async fn close(&self) -> Result<()> {
        self.connection.close(200, "condor-launcher shutting down").await?;
        Ok(())
    }

    async fn publish_inner(&self, routing_key: &str, body: &[u8]) -> Result<()> {
        self.publisher
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        debug!(routing_key, bytes = body.len(), "published message");
        Ok(())
    }

    async fn delete_queue_inner(&self, name: &str) -> Result<()> {
        // Brokers may close the channel on a failed delete, so it gets its own.
        let channel = self.connection.create_channel().await?;
        let removed = channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await?;
        debug!(queue = name, messages = removed, "deleted queue");
        if let Err(err) = channel.close(200, "done").await {
            debug!(error = %err, "closing delete channel failed");
        }
        Ok(())
    }
}

impl Acknowledger for Acker {
    fn settle(&self, disposition: Disposition) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match disposition {
                Disposition::Ack => self.ack(BasicAckOptions::default()).await?,
                Disposition::Reject { requeue } => {
                    self.reject(BasicRejectOptions { requeue }).await?
                }
            }
            Ok(())
        })
    }
}

impl Messenger for AmqpClient {
    fn publish<'a>(&'a self, routing_key: &'a str, body: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.publish_inner(routing_key, body))
    }

    fn delete_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.delete_queue_inner(name))
    }
}
