//! `Run(options)` orchestration (§5, §6): assembles the shared [`Pipeline`],
//! applies the HTTP-only global prefix, and drives every configured runtime
//! to completion — graceful shutdown on `SIGINT`/`SIGTERM`, or immediate
//! teardown on a fatal error from any one of them.

use std::sync::Arc;

use relay_core::error::{RelayError, RoutingError};
use relay_core::hook::DynPostExecutionHook;
use relay_core::pipeline::Pipeline;
use relay_core::router::Router;
use relay_core::transport::ContainerHandle;
use relay_std::EventDispatchHook;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::{App, PendingRoute};
use crate::options::Options;

#[cfg(feature = "http")]
use axum::Router as AxumRouter;
#[cfg(feature = "http")]
use relay_transport::http;
#[cfg(feature = "http")]
use relay_transport::websocket::WebSocketRuntime;

use relay_transport::consumer::ConsumerRuntime;
#[cfg(feature = "amqp")]
use relay_transport::consumer::rabbitmq::RabbitWriter;

/// Methods the shared [`Router`] must never see prefixed: the WebSocket and
/// consumer runtimes build their own dispatch path (a literal upgrade path,
/// and the fixed sentinel `""`, respectively) and would stop matching if a
/// prefix meant for HTTP leaked onto them.
const UNPREFIXED_METHODS: [&str; 2] = ["WS", "EVENT"];

/// Joins `prefix` onto one HTTP route pattern (§4.8). Deliberately not
/// implemented via `Router::with_global_prefix`: that applies to every
/// registered method uniformly, which would also prefix `WS`/`EVENT`
/// registrations (see [`UNPREFIXED_METHODS`]). Mirrors that method's own
/// validation (non-empty, no variable segments) since bypassing it loses
/// the built-in check.
fn join_http_prefix(prefix: &str, pattern: &str) -> Result<String, RelayError> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(RelayError::Routing(RoutingError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: "prefix must contain at least one segment",
        }));
    }
    if trimmed.split('/').any(|segment| segment.starts_with(':')) {
        return Err(RelayError::Routing(RoutingError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: "prefix must not contain variable segments",
        }));
    }
    Ok(format!("/{trimmed}/{}", pattern.trim_start_matches('/')))
}

/// Splits buffered routes into the shared [`Router`] plus, for `WS` routes
/// only, the literal paths the WebSocket runtime needs to mount.
fn build_router(pending_routes: Vec<PendingRoute>, http_prefix: Option<&str>) -> Result<(Router, Vec<String>), RelayError> {
    let mut router = Router::new();
    let mut websocket_paths = Vec::new();

    for PendingRoute { method, pattern, meta } in pending_routes {
        let unprefixed = UNPREFIXED_METHODS.iter().any(|m| m.eq_ignore_ascii_case(&method));
        let resolved = match (unprefixed, http_prefix) {
            (false, Some(prefix)) => join_http_prefix(prefix, &pattern)?,
            _ => pattern,
        };
        if method.eq_ignore_ascii_case("WS") {
            websocket_paths.push(resolved.clone());
        }
        router.register(&method, &resolved, meta)?;
    }

    Ok((router, websocket_paths))
}

/// `Run(options)` (§6): the body behind [`crate::App::run`].
pub(crate) async fn run(app: App, mut options: Options) -> Result<(), RelayError> {
    crate::logging::init();

    let App {
        container,
        resolvers,
        return_handlers,
        interceptors,
        mut publishers,
        hooks,
        pending_routes,
        custom_transports,
    } = app;

    #[cfg(feature = "amqp")]
    if let Some(write_options) = options.rabbitmq_publisher.take() {
        let writer = RabbitWriter::connect(&write_options.uri, &write_options.exchange).await?;
        publishers.push(Arc::new(writer));
    }

    let mut all_hooks: Vec<Arc<dyn DynPostExecutionHook>> = vec![Arc::new(EventDispatchHook::new(publishers))];
    all_hooks.extend(hooks);

    let (router, websocket_paths) = build_router(pending_routes, options.http.global_prefix.as_deref())?;

    container.warm_up()?;

    let pipeline = Arc::new(Pipeline {
        router,
        resolvers,
        return_handlers,
        interceptors,
        hooks: all_hooks,
        container: container.clone(),
    });

    let root_shutdown = CancellationToken::new();

    #[cfg(feature = "http")]
    let http_options = http::HttpOptions {
        address: options.address.clone(),
        disable_recover: options.http.disable_recover,
    };

    #[cfg(feature = "http")]
    let ws_runtime = if websocket_paths.is_empty() {
        None
    } else {
        Some(Arc::new(WebSocketRuntime::new(pipeline.clone(), root_shutdown.clone())))
    };

    #[cfg(feature = "http")]
    let axum_router = {
        let mut combined = http::build_router(pipeline.clone(), root_shutdown.clone(), &http_options);
        if let Some(runtime) = &ws_runtime {
            for path in &websocket_paths {
                let scoped = AxumRouter::<Arc<WebSocketRuntime>>::new();
                combined = combined.merge(runtime.register(scoped, path));
            }
        }
        combined
    };

    #[cfg(feature = "http")]
    let http_task = {
        let listener = tokio::net::TcpListener::bind(&options.address)
            .await
            .map_err(|err| RelayError::Http(relay_core::error::HttpError::internal(format!("bind {}: {err}", options.address))))?;
        info!(address = %options.address, "listening");
        let shutdown = root_shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, axum_router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };

    let mut consumer_runtime = ConsumerRuntime::new(pipeline.clone(), root_shutdown.clone());
    for registration in options.consumer_registry {
        consumer_runtime.register(registration.topic, MoveFactory(registration.factory));
    }
    consumer_runtime.validate().await?;
    let consumer_task = consumer_runtime.run();

    let mut transports = custom_transports;
    for transport in transports.iter_mut() {
        transport.init(ContainerHandle::new(container.clone())).await?;
    }
    for transport in transports.iter_mut() {
        transport.start().await?;
    }

    if options.enable_graceful_shutdown {
        crate::shutdown::wait(&root_shutdown).await;
        root_shutdown.cancel();
    } else {
        root_shutdown.cancelled().await;
    }

    #[cfg(feature = "http")]
    if let Some(runtime) = &ws_runtime {
        runtime.stop().await;
    }

    #[cfg(feature = "http")]
    {
        let drain = tokio::time::timeout(options.shutdown_timeout, http_task);
        match drain.await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => error!(%err, "http server exited with an error"),
            Ok(Err(err)) => error!(%err, "http server task panicked"),
            Err(_) => warn!("http server did not drain within the shutdown timeout"),
        }
    }

    if let Err(err) = consumer_task.await {
        error!(%err, "consumer runtime task panicked");
    }

    for transport in transports.iter_mut() {
        if let Err(err) = transport.stop(root_shutdown.clone()).await {
            error!(%err, "custom transport failed to stop cleanly");
        }
    }

    Ok(())
}

/// Adapts a boxed `ReaderFactory` (as stored on [`crate::options::ConsumerRegistration`])
/// to the by-value `ReaderFactory` bound [`ConsumerRuntime::register`] expects.
struct MoveFactory(Box<dyn relay_transport::consumer::ReaderFactory>);

#[async_trait::async_trait]
impl relay_transport::consumer::ReaderFactory for MoveFactory {
    async fn build(&self) -> Result<Box<dyn relay_transport::consumer::Reader>, RelayError> {
        self.0.build().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::invoker::FnInvoker;
    use relay_core::router::ParameterMeta;
    use std::any::TypeId;

    struct Controller;

    async fn handler(_controller: Arc<Controller>) -> Result<(), RelayError> {
        Ok(())
    }

    fn meta() -> relay_core::router::HandlerMeta {
        relay_core::router::HandlerMeta {
            controller_type: TypeId::of::<Controller>(),
            controller_type_name: "Controller",
            parameters: Vec::new(),
            invoker: Arc::new(FnInvoker::<Controller, _, ()>::new(handler)),
            interceptors: Vec::new(),
        }
    }

    #[test]
    fn join_http_prefix_joins_and_normalizes_slashes() {
        assert_eq!(join_http_prefix("/api/v1/", "/users/:id").unwrap(), "/api/v1/users/:id");
        assert_eq!(join_http_prefix("api", "users").unwrap(), "/api/users");
    }

    #[test]
    fn join_http_prefix_rejects_an_empty_prefix() {
        let err = join_http_prefix("/", "/users").unwrap_err();
        assert!(matches!(err, RelayError::Routing(RoutingError::InvalidPrefix { .. })));
    }

    #[test]
    fn join_http_prefix_rejects_a_variable_segment() {
        let err = join_http_prefix("/:tenant", "/users").unwrap_err();
        assert!(matches!(err, RelayError::Routing(RoutingError::InvalidPrefix { .. })));
    }

    #[test]
    fn build_router_prefixes_http_routes_but_not_ws_or_event() {
        let pending = vec![
            PendingRoute {
                method: "GET".to_string(),
                pattern: "/users".to_string(),
                meta: meta(),
            },
            PendingRoute {
                method: "WS".to_string(),
                pattern: "/chat".to_string(),
                meta: meta(),
            },
            PendingRoute {
                method: "EVENT".to_string(),
                pattern: "".to_string(),
                meta: meta(),
            },
        ];

        let (router, websocket_paths) = build_router(pending, Some("/api/v1")).unwrap();

        assert_eq!(websocket_paths, vec!["/chat".to_string()]);
        router.match_route("GET", "/api/v1/users").unwrap();
        router.match_route("WS", "/chat").unwrap();
        router.match_route("EVENT", "").unwrap();
    }

    #[test]
    fn build_router_without_a_prefix_leaves_http_routes_untouched() {
        let pending = vec![PendingRoute {
            method: "GET".to_string(),
            pattern: "/users".to_string(),
            meta: meta(),
        }];

        let (router, websocket_paths) = build_router(pending, None).unwrap();

        assert!(websocket_paths.is_empty());
        router.match_route("GET", "/users").unwrap();
    }
}
