//! Event-consumer runtime (§4.10): one task per registered topic running a
//! read → invoke → ack/nack loop, with reader construction failures bubbling
//! to a shared, bounded, never-closed error channel that terminates the
//! entire runtime.

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "amqp")]
pub mod rabbitmq;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::context::ExecutionContext;
use relay_core::error::RelayError;
use relay_core::pipeline::{Pipeline, ResponseWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One message read off a topic, with ack/nack capabilities tied to the
/// broker's own delivery semantics.
pub struct Delivery {
    pub event_name: String,
    pub payload: Bytes,
}

/// A per-topic message source. Implementations wrap a concrete broker client
/// (Kafka, RabbitMQ); the runtime only ever sees this trait.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Read the next message, blocking until one arrives or `cancellation`
    /// fires.
    async fn read(&mut self, cancellation: &CancellationToken) -> Result<Option<Delivery>, RelayError>;

    /// Acknowledge successful handling of the most recently read message.
    async fn ack(&mut self) -> Result<(), RelayError>;

    /// Signal failed handling of the most recently read message.
    async fn nack(&mut self) -> Result<(), RelayError>;

    /// Release any held broker resources. Used by `Validate` to construct
    /// and immediately tear down a reader as a pre-flight check.
    async fn close(&mut self) -> Result<(), RelayError>;
}

/// A factory that builds one `Reader` per topic, invoked lazily by the
/// runtime's per-topic task (so a transient broker outage at boot doesn't
/// prevent registering the topic, only starting it).
///
/// `async` so broker connect/declare/bind calls (lapin's, in particular) are
/// polled by the runtime that owns the task instead of bridging to a foreign
/// executor — see `RabbitReaderFactory::build`.
#[async_trait]
pub trait ReaderFactory: Send + Sync + 'static {
    async fn build(&self) -> Result<Box<dyn Reader>, RelayError>;
}

#[async_trait]
impl<F, Fut> ReaderFactory for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Box<dyn Reader>, RelayError>> + Send,
{
    async fn build(&self) -> Result<Box<dyn Reader>, RelayError> {
        self().await
    }
}

struct Registration {
    topic: String,
    factory: Box<dyn ReaderFactory>,
}

/// A `ResponseWriter` bound into consumer contexts. Consumer handlers
/// communicate success/failure through their `Result` return, not a
/// transport-shaped response body, so writes are discarded.
struct NullResponseWriter;

impl ResponseWriter for NullResponseWriter {
    fn write(&self, _status: u16, _content_type: &str, _body: Bytes) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Bounded, never-closed fatal-error channel: one slot per registered topic.
/// A slot that can't be claimed because the channel is full is logged and
/// dropped rather than blocking the reporting task (the runtime is already
/// going down).
pub struct ConsumerRuntime {
    pipeline: Arc<Pipeline>,
    registrations: Vec<Registration>,
    shutdown: CancellationToken,
}

impl ConsumerRuntime {
    pub fn new(pipeline: Arc<Pipeline>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            registrations: Vec::new(),
            shutdown,
        }
    }

    /// Register a topic with its reader factory.
    pub fn register(&mut self, topic: impl Into<String>, factory: impl ReaderFactory + 'static) {
        self.registrations.push(Registration {
            topic: topic.into(),
            factory: Box::new(factory),
        });
    }

    /// Construct and immediately close a reader for every registered topic,
    /// surfacing the first failure without starting any runtime loops.
    pub async fn validate(&self) -> Result<(), RelayError> {
        for registration in &self.registrations {
            let mut reader = registration.factory.build().await?;
            reader.close().await?;
        }
        Ok(())
    }

    /// Spawns one task per registered topic and returns a handle that
    /// resolves when a fatal error is reported or `shutdown` fires.
    pub fn run(mut self) -> tokio::task::JoinHandle<()> {
        // One slot per topic: a fatal error from any single reader must
        // never block on a full channel while the runtime is shutting down.
        let (errors, mut error_rx) = mpsc::channel(self.registrations.len().max(1));
        let shutdown = self.shutdown.clone();
        let topics = std::mem::take(&mut self.registrations);
        let pipeline = self.pipeline.clone();

        for registration in topics {
            let pipeline = pipeline.clone();
            let shutdown = shutdown.clone();
            let errors = errors.clone();
            tokio::spawn(async move { run_topic(registration, pipeline, shutdown, errors).await });
        }
        drop(errors);

        tokio::spawn(async move {
            tokio::select! {
                Some(err) = error_rx.recv() => {
                    error!(%err, "consumer runtime fatal error, stopping");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        })
    }
}

async fn run_topic(
    registration: Registration,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    errors: mpsc::Sender<RelayError>,
) {
    let mut reader = match registration.factory.build().await {
        Ok(reader) => reader,
        Err(err) => {
            error!(topic = %registration.topic, %err, "failed to build reader");
            let _ = errors.try_send(err);
            return;
        }
    };

    info!(topic = %registration.topic, "consumer started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let delivery = match reader.read(&shutdown).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(err) => {
                if shutdown.is_cancelled() {
                    break;
                }
                warn!(topic = %registration.topic, %err, "read error, continuing");
                continue;
            }
        };

        let mut ctx = ExecutionContext::consumer(shutdown.child_token(), delivery.event_name, delivery.payload);
        ctx.store_mut()
            .set::<Arc<dyn ResponseWriter>>(relay_core::context::RESPONSE_WRITER_KEY, Arc::new(NullResponseWriter));

        let result = pipeline.execute(&mut ctx).await;
        let ack_result = if result.is_ok() { reader.ack().await } else { reader.nack().await };
        if let Err(err) = ack_result {
            warn!(topic = %registration.topic, %err, "ack/nack failed");
        }
        if let Err(err) = result {
            warn!(topic = %registration.topic, %err, "handler failed for message");
        }
    }

    let _ = reader.close().await;
    info!(topic = %registration.topic, "consumer stopped");
}
