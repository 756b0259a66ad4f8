//! # Per-Request Event Bus and PostExecutionHook (§3, §4.7)

use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::RelayError;

/// A domain event appended to a request's event bus during handler
/// execution. Implementations are typically small, cheaply cloned structs.
pub trait DomainEvent: Any + Send + Sync + Debug {
    /// A stable name for the event kind, used in logs and by publishers that
    /// route on it.
    fn name(&self) -> &'static str;

    /// Upcast to `&dyn Any` so publishers can downcast to their concrete
    /// event type.
    fn as_any(&self) -> &dyn Any;

    /// When the event occurred. Defaults to the moment it's asked for, since
    /// most events are published immediately after the fact that raised
    /// them; long-lived events should override this with the real instant.
    fn occurred_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    /// JSON-encode the event's own fields (§6: "Domain event contract ...
    /// JSON-serializable"). Implementations typically delegate to
    /// `serde_json::to_vec(self)` over their concrete, `Serialize`-deriving
    /// type; the trait can't require `Serialize` directly since `dyn
    /// DomainEvent` wouldn't be object-safe with it as a supertrait.
    fn to_json(&self) -> Result<Vec<u8>, RelayError>;
}

/// An ordered, append-only buffer of domain events (§3: "per-request event
/// bus"). Owned exclusively by one `ExecutionContext`; never shared across
/// requests.
#[derive(Default)]
pub struct EventBus {
    events: Vec<Box<dyn DomainEvent>>,
}

impl EventBus {
    /// Append an event. Called by handler logic during its own execution.
    pub fn publish(&mut self, event: impl DomainEvent + 'static) {
        self.events.push(Box::new(event));
    }

    /// Return the buffered events and empty the bus. Idempotent: a second
    /// call yields an empty vec (§8).
    pub fn drain(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    /// Whether any events are currently buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A sink that delivers drained domain events somewhere (a message broker,
/// an in-process subscriber, a log). Registered with the EventDispatch hook
/// (`relay_std::event::EventDispatchHook`).
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one event. Errors are logged by the caller and never fail
    /// the request (§4.7).
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), RelayError>;
}

/// Object-safe twin of [`Publisher`] for storage in heterogeneous
/// registries. A blanket impl means callers never write this by hand.
pub trait DynPublisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        event: &'a dyn DomainEvent,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RelayError>> + Send + 'a>>;
}

impl<P: Publisher> DynPublisher for P {
    fn publish<'a>(
        &'a self,
        event: &'a dyn DomainEvent,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RelayError>> + Send + 'a>>
    {
        Box::pin(Publisher::publish(self, event))
    }
}

/// Runs after a successful (or failed) handler invocation (§4.7). The core
/// ships exactly one implementation, `EventDispatchHook`, in `relay-std`;
/// this trait exists so additional tail hooks can be composed if a consumer
/// of the framework ever needs one.
#[async_trait]
pub trait PostExecutionHook: Send + Sync {
    /// `outcome` is `Err` when the handler (or an earlier pipeline stage)
    /// failed; implementations must not publish events in that case (§4.7).
    async fn run(&self, ctx: &mut ExecutionContext, outcome: &Result<(), RelayError>);
}

/// Object-safe twin of [`PostExecutionHook`].
pub trait DynPostExecutionHook: Send + Sync {
    fn run<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        outcome: &'a Result<(), RelayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
}

impl<H: PostExecutionHook> DynPostExecutionHook for H {
    fn run<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        outcome: &'a Result<(), RelayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(PostExecutionHook::run(self, ctx, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl DomainEvent for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn to_json(&self) -> Result<Vec<u8>, RelayError> {
            Ok(b"{}".to_vec())
        }
    }

    #[test]
    fn drain_is_idempotent() {
        let mut bus = EventBus::default();
        bus.publish(Ping);
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn events_preserve_order() {
        #[derive(Debug)]
        struct Numbered(u32);
        impl DomainEvent for Numbered {
            fn name(&self) -> &'static str {
                "numbered"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn to_json(&self) -> Result<Vec<u8>, RelayError> {
                Ok(format!("{{\"n\":{}}}", self.0).into_bytes())
            }
        }

        let mut bus = EventBus::default();
        bus.publish(Numbered(1));
        bus.publish(Numbered(2));
        let drained = bus.drain();
        let values: Vec<u32> = drained
            .iter()
            .map(|e| e.as_any().downcast_ref::<Numbered>().unwrap().0)
            .collect();
        assert_eq!(values, vec![1, 2]);
    }
}
