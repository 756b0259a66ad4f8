//! RabbitMQ reader/writer (§6, §4.10): a durable, non-auto-delete topic
//! exchange per application; the reader binds a queue to it per topic, the
//! writer publishes JSON-encoded domain events onto it.
//!
//! §9 notes the original `Writer` constructor silently returned nil on
//! connection failure; `connect` here returns a `Result` instead.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use relay_core::error::{HttpError, RelayError};
use relay_core::hook::DomainEvent;
use tokio_util::sync::CancellationToken;

use super::{Delivery, Reader, ReaderFactory};

fn connection_error(err: impl std::fmt::Display) -> RelayError {
    RelayError::Http(HttpError::internal(format!("rabbitmq connection failed: {err}")))
}

/// Read-side options for one RabbitMQ topic.
#[derive(Debug, Clone)]
pub struct RabbitReadOptions {
    pub uri: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

pub struct RabbitReaderFactory {
    options: RabbitReadOptions,
}

impl RabbitReaderFactory {
    pub fn new(options: RabbitReadOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ReaderFactory for RabbitReaderFactory {
    async fn build(&self) -> Result<Box<dyn Reader>, RelayError> {
        let options = &self.options;
        let connection = Connection::connect(&options.uri, ConnectionProperties::default())
            .await
            .map_err(connection_error)?;
        let channel = connection.create_channel().await.map_err(connection_error)?;

        channel
            .exchange_declare(
                &options.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connection_error)?;

        channel
            .queue_declare(&options.queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(connection_error)?;

        channel
            .queue_bind(
                &options.queue,
                &options.exchange,
                &options.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(connection_error)?;

        let consumer = channel
            .basic_consume(&options.queue, "relay-consumer", BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(connection_error)?;

        Ok(Box::new(RabbitReader {
            _connection: connection,
            channel,
            consumer,
            topic: options.routing_key.clone(),
            pending: None,
        }) as Box<dyn Reader>)
    }
}

struct RabbitReader {
    _connection: Connection,
    channel: Channel,
    consumer: Consumer,
    topic: String,
    pending: Option<lapin::message::Delivery>,
}

#[async_trait]
impl Reader for RabbitReader {
    async fn read(&mut self, cancellation: &CancellationToken) -> Result<Option<Delivery>, RelayError> {
        tokio::select! {
            next = self.consumer.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        let payload = Bytes::copy_from_slice(&delivery.data);
                        self.pending = Some(delivery);
                        Ok(Some(Delivery { event_name: self.topic.clone(), payload }))
                    }
                    Some(Err(err)) => Err(RelayError::Http(HttpError::internal(format!("rabbitmq read error: {err}")))),
                    None => Ok(None),
                }
            }
            _ = cancellation.cancelled() => Ok(None),
        }
    }

    async fn ack(&mut self) -> Result<(), RelayError> {
        if let Some(delivery) = self.pending.take() {
            delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(|err| RelayError::Http(HttpError::internal(format!("rabbitmq ack failed: {err}"))))?;
        }
        Ok(())
    }

    async fn nack(&mut self) -> Result<(), RelayError> {
        if let Some(delivery) = self.pending.take() {
            delivery
                .nack(BasicNackOptions { requeue: true, ..Default::default() })
                .await
                .map_err(|err| RelayError::Http(HttpError::internal(format!("rabbitmq nack failed: {err}"))))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.channel
            .close(0, "shutdown")
            .await
            .map_err(|err| RelayError::Http(HttpError::internal(format!("rabbitmq channel close failed: {err}"))))
    }
}

/// Publishes domain events onto a durable topic exchange (§6).
pub struct RabbitWriter {
    channel: Channel,
    exchange: String,
}

impl RabbitWriter {
    /// Connects and declares the exchange. Unlike the original source, a
    /// connection failure is surfaced here rather than silently producing a
    /// non-functional writer (§9).
    pub async fn connect(uri: &str, exchange: &str) -> Result<Self, RelayError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(connection_error)?;
        let channel = connection.create_channel().await.map_err(connection_error)?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connection_error)?;
        Ok(Self {
            channel,
            exchange: exchange.to_string(),
        })
    }

    /// Publish one domain event, JSON-encoded, routed by its name.
    pub async fn publish(&self, event: &dyn DomainEvent) -> Result<(), RelayError> {
        let body = event.to_json()?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_timestamp(event.occurred_at().timestamp() as u64)
            .with_kind(event.name().into());

        self.channel
            .basic_publish(&self.exchange, event.name(), BasicPublishOptions::default(), &body, properties)
            .await
            .map_err(|err| RelayError::Http(HttpError::internal(format!("rabbitmq publish failed: {err}"))))?
            .await
            .map_err(|err| RelayError::Http(HttpError::internal(format!("rabbitmq publish not confirmed: {err}"))))?;
        Ok(())
    }
}

#[async_trait]
impl relay_core::hook::Publisher for RabbitWriter {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), RelayError> {
        RabbitWriter::publish(self, event).await
    }
}
