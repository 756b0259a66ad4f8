//! Kafka reader (§6, §4.10): one consumer-group-per-topic `StreamConsumer`,
//! committing the fetched message after the handler returns successfully.

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message as _;
use relay_core::error::{HttpError, RelayError};
use tokio_util::sync::CancellationToken;

use super::{Delivery, Reader, ReaderFactory};

/// Read-side options for one Kafka topic.
#[derive(Debug, Clone)]
pub struct KafkaReadOptions {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

pub struct KafkaReaderFactory {
    options: KafkaReadOptions,
}

impl KafkaReaderFactory {
    pub fn new(options: KafkaReadOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ReaderFactory for KafkaReaderFactory {
    async fn build(&self) -> Result<Box<dyn Reader>, RelayError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.options.brokers)
            .set("group.id", &self.options.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|err| RelayError::Http(HttpError::internal(format!("failed to build kafka consumer: {err}"))))?;

        consumer
            .subscribe(&[self.options.topic.as_str()])
            .map_err(|err| RelayError::Http(HttpError::internal(format!("failed to subscribe to {}: {err}", self.options.topic))))?;

        Ok(Box::new(KafkaReader {
            consumer,
            topic: self.options.topic.clone(),
            pending: None,
        }))
    }
}

struct KafkaReader {
    consumer: StreamConsumer,
    topic: String,
    pending: Option<rdkafka::message::OwnedMessage>,
}

#[async_trait]
impl Reader for KafkaReader {
    async fn read(&mut self, cancellation: &CancellationToken) -> Result<Option<Delivery>, RelayError> {
        tokio::select! {
            result = self.consumer.recv() => {
                let message = result
                    .map_err(|err| RelayError::Http(HttpError::internal(format!("kafka read error on {}: {err}", self.topic))))?;
                let payload = Bytes::copy_from_slice(message.payload().unwrap_or_default());
                let owned = message.detach();
                self.pending = Some(owned);
                Ok(Some(Delivery {
                    event_name: self.topic.clone(),
                    payload,
                }))
            }
            _ = cancellation.cancelled() => Ok(None),
        }
    }

    async fn ack(&mut self) -> Result<(), RelayError> {
        if let Some(message) = self.pending.take() {
            self.consumer
                .commit_message(&message, CommitMode::Sync)
                .map_err(|err| RelayError::Http(HttpError::internal(format!("kafka commit failed: {err}"))))?;
        }
        Ok(())
    }

    async fn nack(&mut self) -> Result<(), RelayError> {
        // Leaving the offset uncommitted is the nack: the next rebalance (or
        // this same consumer's restart) redelivers the message.
        self.pending = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        Ok(())
    }
}
