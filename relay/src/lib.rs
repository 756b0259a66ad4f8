//! # relay - a reflection-free backend application framework
//!
//! `relay` wires a dependency container, a typed route table, and an
//! interceptor chain into a single [`App`] you configure in code and hand
//! to [`App::run`]. One shared execution pipeline drives every transport —
//! HTTP, WebSocket, and broker consumers — so a handler written once keeps
//! the same argument-resolution and return-value rules no matter which
//! transport calls it.
//!
//! ```rust,ignore
//! use relay::{App, Options};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relay::RelayError> {
//!     let mut app = App::new();
//!     app.constructor(|_| Ok(Greeter));
//!     app.route::<Greeter, _, _>("GET", "/hello/:name", Greeter::hello);
//!     app.run(Options::default()).await
//! }
//! # struct Greeter;
//! # impl Greeter { async fn hello(&self) {} }
//! ```

#![deny(clippy::pub_use, clippy::wildcard_imports)]
#![warn(missing_docs)]

mod app;
mod boot;
mod logging;
mod route;
mod shutdown;

pub mod config;
pub mod options;

// ============================================================================
// Boot API (this crate)
// ============================================================================
pub use app::{App, RouteBuilder, WebSocketHandle};
pub use options::Options;
pub use route::{ParamList, RouteInterceptors};

// ============================================================================
// Contracts (from relay-core)
// ============================================================================
pub use relay_core::container::{Container, ContainerError};
pub use relay_core::context::{ExecutionContext, HeaderView, QueryView, WsSender, RESPONSE_WRITER_KEY};
pub use relay_core::error::{BoxError, HttpError, RelayError, RoutingError};
pub use relay_core::hook::{DomainEvent, DynPostExecutionHook, DynPublisher, EventBus, PostExecutionHook, Publisher};
pub use relay_core::interceptor::{Interceptor, PreOutcome};
pub use relay_core::invoker::Handler;
pub use relay_core::outcome::{IntoOutcome, Outcome, ReturnValueHandler};
pub use relay_core::pipeline::{Pipeline, ResponseWriter};
pub use relay_core::resolver::{ArgumentResolver, ParamBinding};
pub use relay_core::router::{HandlerMeta, ParameterKind, ParameterMeta};
pub use relay_core::transport::{ContainerHandle, CustomTransport};

// ============================================================================
// Built-in resolvers, return handlers, and hooks (from relay-std)
// ============================================================================

/// Built-in parameter types, return handlers, and hooks, all registered
/// into a fresh [`App`] by [`App::new`]. Exposed as a module so user code
/// can name them (e.g. `relay::std_lib::PathInt`) without depending on
/// `relay-std` directly.
pub mod std_lib {
    #![allow(clippy::wildcard_imports)]
    pub use relay_std::*;
}

// ============================================================================
// Transport runtimes (from relay-transport)
// ============================================================================

/// HTTP transport types, re-exported for callers who need to reach past
/// `Options` (e.g. to reuse [`http::HttpOptions`] while embedding `relay`'s
/// axum router into a larger one).
#[cfg(feature = "http")]
pub mod http {
    pub use relay_transport::http::{build_router, HttpOptions};
}

/// WebSocket runtime types.
#[cfg(feature = "http")]
pub mod websocket {
    pub use relay_transport::websocket::{WebSocketOptions, WebSocketRuntime};
}

/// Broker consumer runtime types: the [`consumer::Reader`]/[`consumer::ReaderFactory`]
/// contracts plus the Kafka and RabbitMQ backends.
pub mod consumer {
    pub use relay_transport::consumer::{ConsumerRuntime, Delivery, Reader, ReaderFactory};

    #[cfg(feature = "kafka")]
    pub use relay_transport::consumer::kafka::{KafkaReadOptions, KafkaReaderFactory};

    #[cfg(feature = "amqp")]
    pub use relay_transport::consumer::rabbitmq::{RabbitReadOptions, RabbitReaderFactory, RabbitWriter};
}
