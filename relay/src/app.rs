//! The boot API (§6): `App::new()` yields an `App`; `Constructor`, `Route`,
//! `Interceptor`, `WebSocket().Register`, and `Transport` all append to it;
//! `Run(options)` assembles everything into a `Pipeline` and drives the
//! configured runtimes to completion.

use std::any::{Any, TypeId};
use std::sync::Arc;

use relay_core::container::{Container, ContainerError};
use relay_core::hook::{DynPostExecutionHook, Publisher};
use relay_core::interceptor::{DynInterceptor, Interceptor, InterceptorChain};
use relay_core::invoker::{FnInvoker, Handler};
use relay_core::outcome::ReturnHandlerRegistry;
use relay_core::resolver::ResolverRegistry;
use relay_core::router::HandlerMeta;
use relay_core::transport::CustomTransport;

use crate::options::Options;
use crate::route::{ParamList, RouteInterceptors};

pub(crate) struct PendingRoute {
    pub method: String,
    pub pattern: String,
    pub meta: HandlerMeta,
}

/// Assembles constructors, routes, interceptors, and transports, then runs
/// them together via [`App::run`] (§6).
pub struct App {
    pub(crate) container: Container,
    /// One registry shared by every transport (§4.3): HTTP, WebSocket, and
    /// consumer built-ins are all registered into it up front, and each
    /// handler's declared parameter types pick out the right resolver by
    /// concrete type, so there is never a conflict between, say, `PathInt`
    /// (HTTP-only) and `WsConnId` (WebSocket-only) sharing one table.
    pub(crate) resolvers: ResolverRegistry,
    pub(crate) return_handlers: ReturnHandlerRegistry,
    pub(crate) interceptors: InterceptorChain,
    pub(crate) publishers: Vec<Arc<dyn relay_core::hook::DynPublisher>>,
    pub(crate) hooks: Vec<Arc<dyn DynPostExecutionHook>>,
    pub(crate) pending_routes: Vec<PendingRoute>,
    pub(crate) custom_transports: Vec<Box<dyn CustomTransport>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// `New()` (§6): an app with every built-in resolver and return handler
    /// already registered, and an empty route table, constructor set, and
    /// interceptor chain.
    pub fn new() -> Self {
        let mut resolvers = ResolverRegistry::new();
        relay_std::register_http_builtins(&mut resolvers);
        relay_std::register_websocket_builtins(&mut resolvers);
        relay_std::register_consumer_builtins(&mut resolvers);

        let mut return_handlers = ReturnHandlerRegistry::new();
        relay_std::register_return_value_builtins(&mut return_handlers);

        Self {
            container: Container::new(),
            resolvers,
            return_handlers,
            interceptors: InterceptorChain::new(),
            publishers: Vec::new(),
            hooks: Vec::new(),
            pending_routes: Vec::new(),
            custom_transports: Vec::new(),
        }
    }

    /// `Constructor(fn)` (§6): register how to build one component. Keyed
    /// by `T`; a later registration for the same `T` replaces the earlier
    /// one (§4.1).
    pub fn constructor<T, F>(&mut self, build: F) -> &mut Self
    where
        T: Any + Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        self.container.register(build);
        self
    }

    /// `Route(method, path, handlerRef, opts...)` (§6). `C` is the handler's
    /// receiver (controller) type, resolved from the container on every
    /// invocation; `Args` is its declared argument tuple.
    pub fn route<C, F, Args>(&mut self, method: impl Into<String>, pattern: impl Into<String>, handler: F) -> RouteBuilder<'_>
    where
        C: Any + Send + Sync + 'static,
        F: Handler<C, Args>,
        Args: ParamList + Send + 'static,
    {
        let meta = HandlerMeta {
            controller_type: TypeId::of::<C>(),
            controller_type_name: std::any::type_name::<C>(),
            parameters: Args::metas(),
            invoker: Arc::new(FnInvoker::<C, F, Args>::new(handler)),
            interceptors: Vec::new(),
        };
        self.pending_routes.push(PendingRoute {
            method: method.into(),
            pattern: pattern.into(),
            meta,
        });
        let index = self.pending_routes.len() - 1;
        RouteBuilder { app: self, index }
    }

    /// `Interceptor(it...)` (§6): append a global interceptor, deduplicated
    /// by concrete type with first-registration-wins (§4.5).
    pub fn interceptor(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.interceptors.register(Arc::new(interceptor));
        self
    }

    /// Register a domain-event publisher fanned out to by the built-in
    /// `EventDispatchHook` after a successful invocation (§4.7). Not part of
    /// the distilled boot API's literal surface, but the natural place to
    /// wire publishers given `Options.RabbitMQ`'s write side also feeds the
    /// same hook (see `SPEC_FULL.md`).
    pub fn publisher(&mut self, publisher: impl Publisher + 'static) -> &mut Self {
        self.publishers.push(Arc::new(publisher));
        self
    }

    /// Append an additional tail hook run after return-value handling
    /// (§4.7). The built-in `EventDispatchHook` is always installed; this
    /// is for callers who need another one.
    pub fn post_execution_hook(&mut self, hook: impl DynPostExecutionHook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// `WebSocket()` (§6): a handle exposing `Register(path, handlerRef)`.
    pub fn websocket(&mut self) -> WebSocketHandle<'_> {
        WebSocketHandle { app: self }
    }

    /// `Transport(hook)` (§6): register a custom transport that receives a
    /// resolve-only container view and participates in the same
    /// init/start/stop lifecycle as the built-in runtimes.
    pub fn transport(&mut self, transport: impl CustomTransport + 'static) -> &mut Self {
        self.custom_transports.push(Box::new(transport));
        self
    }

    /// `Run(options)` (§6): warm up the container, assemble the pipeline,
    /// and run every configured runtime until graceful shutdown or a fatal
    /// error.
    pub async fn run(self, options: Options) -> Result<(), relay_core::error::RelayError> {
        crate::boot::run(self, options).await
    }
}

/// A handle returned by [`App::route`] for attaching route-scoped
/// interceptors (§6: `Route(method, path, handlerRef, opts…)`).
pub struct RouteBuilder<'a> {
    app: &'a mut App,
    index: usize,
}

impl RouteBuilder<'_> {
    /// Attach route-scoped interceptors, appended after the global chain
    /// for this route only (§4.5).
    pub fn interceptors(self, interceptors: RouteInterceptors) -> Self {
        self.app.pending_routes[self.index].meta.interceptors = interceptors;
        self
    }
}

/// Returned by [`App::websocket`]; mirrors `Route` but always registers
/// under the `WS` method, matching the per-frame dispatch the WebSocket
/// runtime performs (§4.9, §3: `WebSocketContext`).
pub struct WebSocketHandle<'a> {
    app: &'a mut App,
}

impl WebSocketHandle<'_> {
    /// `Register(path, handlerRef)` (§6).
    pub fn register<C, F, Args>(&mut self, path: impl Into<String>, handler: F) -> RouteBuilder<'_>
    where
        C: Any + Send + Sync + 'static,
        F: Handler<C, Args>,
        Args: ParamList + Send + 'static,
    {
        self.app.route::<C, F, Args>("WS", path, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::error::{ContainerError, RelayError};

    struct Greeter {
        name: String,
    }

    async fn say_hello(controller: Arc<Greeter>) -> Result<String, RelayError> {
        Ok(format!("hello, {}", controller.name))
    }

    #[test]
    fn new_app_has_no_routes_and_no_custom_transports() {
        let app = App::new();
        assert!(app.pending_routes.is_empty());
        assert!(app.custom_transports.is_empty());
    }

    #[test]
    fn constructor_is_stored_and_resolvable() {
        let mut app = App::new();
        app.constructor::<Greeter, _>(|_| Ok(Greeter { name: "ada".to_string() }));
        app.container.warm_up().unwrap();
        let greeter = app.container.resolve::<Greeter>().unwrap();
        assert_eq!(greeter.name, "ada");
    }

    #[test]
    fn a_later_constructor_replaces_an_earlier_one_for_the_same_type() {
        let mut app = App::new();
        app.constructor::<Greeter, _>(|_| Ok(Greeter { name: "first".to_string() }));
        app.constructor::<Greeter, _>(|_| Ok(Greeter { name: "second".to_string() }));
        let greeter = app.container.resolve::<Greeter>().unwrap();
        assert_eq!(greeter.name, "second");
    }

    #[test]
    fn route_buffers_a_pending_route_with_the_declared_method_and_pattern() {
        let mut app = App::new();
        app.route::<Greeter, _, ()>("GET", "/hello", say_hello);
        assert_eq!(app.pending_routes.len(), 1);
        assert_eq!(app.pending_routes[0].method, "GET");
        assert_eq!(app.pending_routes[0].pattern, "/hello");
    }

    #[test]
    fn websocket_register_uses_the_ws_method() {
        let mut app = App::new();
        app.websocket().register::<Greeter, _, ()>("/chat", say_hello);
        assert_eq!(app.pending_routes[0].method, "WS");
        assert_eq!(app.pending_routes[0].pattern, "/chat");
    }

    #[test]
    fn route_builder_attaches_route_scoped_interceptors_without_touching_the_global_chain() {
        let mut app = App::new();
        app.route::<Greeter, _, ()>("GET", "/hello", say_hello)
            .interceptors(crate::route::RouteInterceptors::new());
        assert!(app.pending_routes[0].meta.interceptors.is_empty());
        assert!(app.interceptors.effective(&[]).is_empty());
    }

    #[test]
    fn container_error_surfaces_from_resolve_when_nothing_was_registered() {
        let app = App::new();
        let err = app.container.resolve::<Greeter>().unwrap_err();
        assert!(matches!(err, ContainerError::NoConstructor { .. }));
    }
}
