//! Core traits and data model for Relay, a back-end application framework
//! that turns plain handler functions into request processors across HTTP,
//! WebSocket, and message-broker transports.
//!
//! This crate carries no transport or codec dependencies: the dependency
//! container, router, argument/return-value dispatch, interceptor chain,
//! execution pipeline, and per-request event bus all live here, generic
//! over whatever concrete resolvers, return handlers, and transports
//! `relay-std`/`relay-transport` supply.

pub mod container;
pub mod context;
pub mod error;
pub mod hook;
pub mod interceptor;
pub mod invoker;
pub mod outcome;
pub mod pipeline;
pub mod resolver;
pub mod router;
pub mod transport;

pub use container::Container;
pub use context::{ExecutionContext, HeaderView, QueryView, Store, Transport as ContextTransport, WsSender, RESPONSE_WRITER_KEY};
pub use error::{BoxError, ContainerError, HttpError, RelayError, RoutingError};
pub use hook::{DomainEvent, DynPostExecutionHook, EventBus, PostExecutionHook, Publisher};
pub use interceptor::{Abort, DynInterceptor, Interceptor, InterceptorChain};
pub use invoker::{DynInvoker, FnInvoker, FromResolved, Handler};
pub use outcome::{IntoOutcome, IntoOutcomeValue, Outcome, ReturnHandlerRegistry, ReturnValueHandler};
pub use pipeline::{http_error, Pipeline, ResponseWriter};
pub use resolver::{ArgumentResolver, GenericResolveFn, ParamBinding, ResolverRegistry};
pub use router::{HandlerMeta, ParameterKind, ParameterMeta, Router};
pub use transport::{ContainerHandle, CustomTransport};
