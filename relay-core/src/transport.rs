//! # CustomTransport facade (§6, `core/transport.go` in original_source)
//!
//! The boot API lets a caller register an arbitrary transport hook that
//! receives a narrow view of the container (`Resolve` only, no
//! registration) and participates in the same `Init -> Start -> Stop`
//! lifecycle the built-in HTTP/WebSocket/consumer runtimes follow.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::container::Container;
use crate::error::ContainerError;

/// A read-only facade over the [`Container`] handed to custom transports.
/// Narrower than `Container` itself: a transport can resolve components but
/// never register new constructors once the framework has booted.
#[derive(Clone)]
pub struct ContainerHandle {
    container: Container,
}

impl ContainerHandle {
    /// Wrap a container for exposure to custom transports.
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    /// Resolve a component, exactly as `Container::resolve` does.
    pub fn resolve<T: Any + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.container.resolve::<T>()
    }
}

/// A transport backend registered via the boot API's `Transport(hook)`
/// (§6). Given the container at `init` time; started and stopped as part
/// of the same shutdown tree as the built-in transports.
#[async_trait]
pub trait CustomTransport: Send + Sync {
    /// Called once at boot, before [`Self::start`], with a resolve-only
    /// view of the container.
    async fn init(&mut self, container: ContainerHandle) -> Result<(), crate::error::RelayError>;

    /// Run until cancelled or until the transport stops itself.
    async fn start(&mut self) -> Result<(), crate::error::RelayError>;

    /// Stop gracefully, honoring the shutdown timeout by returning promptly
    /// when `cancelled` is already signaled.
    async fn stop(&mut self, cancelled: tokio_util::sync::CancellationToken) -> Result<(), crate::error::RelayError>;
}
