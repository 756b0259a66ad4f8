//! Fans drained domain events out to registered publishers (§4.7).

use async_trait::async_trait;
use relay_core::context::ExecutionContext;
use relay_core::error::RelayError;
use relay_core::hook::{DynPublisher, PostExecutionHook, Publisher};

/// Drains the request's event bus and publishes each event to every
/// registered publisher, in registration order. Skips publishing entirely
/// when the invocation failed (§4.7: "must not publish events" on error). A
/// publisher error is logged and does not fail the request: event delivery
/// is best-effort, not part of the request's own success/failure.
pub struct EventDispatchHook {
    publishers: Vec<std::sync::Arc<dyn DynPublisher>>,
}

impl EventDispatchHook {
    /// Build a hook that fans out to `publishers`, in order.
    pub fn new(publishers: Vec<std::sync::Arc<dyn DynPublisher>>) -> Self {
        Self { publishers }
    }

    /// Register one more publisher.
    pub fn register(&mut self, publisher: impl Publisher + 'static) -> &mut Self {
        self.publishers.push(std::sync::Arc::new(publisher));
        self
    }
}

impl Default for EventDispatchHook {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl PostExecutionHook for EventDispatchHook {
    async fn run(&self, ctx: &mut ExecutionContext, outcome: &Result<(), RelayError>) {
        if outcome.is_err() {
            return;
        }
        let events = ctx.events_mut().drain();
        for event in &events {
            for publisher in &self.publishers {
                if let Err(err) = publisher.publish(event.as_ref()).await {
                    tracing::warn!(event = event.name(), %err, "event publish failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::context::QueryView;
    use relay_core::hook::DomainEvent;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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

    struct CountingPublisher(Arc<AtomicUsize>);

    #[async_trait]
    impl Publisher for CountingPublisher {
        async fn publish(&self, _event: &dyn DomainEvent) -> Result<(), RelayError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        )
    }

    #[tokio::test]
    async fn publishes_drained_events_on_success() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut hook = EventDispatchHook::default();
        hook.register(CountingPublisher(count.clone()));
        let mut ctx = ctx();
        ctx.events_mut().publish(Ping);

        hook.run(&mut ctx, &Ok(())).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(ctx.events().is_empty());
    }

    #[tokio::test]
    async fn skips_publishing_on_error() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut hook = EventDispatchHook::default();
        hook.register(CountingPublisher(count.clone()));
        let mut ctx = ctx();
        ctx.events_mut().publish(Ping);

        hook.run(&mut ctx, &Err(relay_core::error::HttpError::internal("boom").into())).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!ctx.events().is_empty());
    }
}
