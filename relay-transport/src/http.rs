//! HTTP adapter (§4.8): mounts a catch-all route that wraps every incoming
//! request into an `ExecutionContext` and drives it through the `Pipeline`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router as AxumRouter;
use bytes::Bytes;
use futures::FutureExt;
use relay_core::context::{ExecutionContext, HeaderView, QueryView, RESPONSE_WRITER_KEY};
use relay_core::error::{HttpError, RelayError};
use relay_core::pipeline::{Pipeline, ResponseWriter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Request body size above which the catch-all route rejects the request
/// before buffering it, to bound memory use per connection.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// §4.8 options: panic recovery is opt-out, a global prefix is set once at
/// `Router` construction time (not here — see `relay_core::router::Router::with_global_prefix`).
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub address: String,
    pub disable_recover: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            disable_recover: false,
        }
    }
}

struct CapturedResponse {
    status: u16,
    content_type: String,
    body: Bytes,
}

#[derive(Default)]
struct AxumResponseWriter {
    response: Mutex<Option<CapturedResponse>>,
    headers: Mutex<Vec<(String, String)>>,
}

impl ResponseWriter for AxumResponseWriter {
    fn write(&self, status: u16, content_type: &str, body: Bytes) -> Result<(), RelayError> {
        *self.response.lock().unwrap() = Some(CapturedResponse {
            status,
            content_type: content_type.to_string(),
            body,
        });
        Ok(())
    }

    fn set_header(&self, name: &str, value: &str) {
        let mut headers = self.headers.lock().unwrap();
        headers.retain(|(k, _)| k != name);
        headers.push((name.to_string(), value.to_string()));
    }

    fn add_header(&self, name: &str, value: &str) {
        self.headers.lock().unwrap().push((name.to_string(), value.to_string()));
    }
}

impl AxumResponseWriter {
    fn into_response(self) -> Response {
        let headers = self.headers.into_inner().unwrap();
        let captured = self.response.into_inner().unwrap();
        let Some(captured) = captured else {
            error!("handler completed without writing a response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let status = StatusCode::from_u16(captured.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::builder().status(status);
        response = response.header("Content-Type", captured.content_type);
        for (name, value) in headers {
            response = response.header(name, value);
        }
        response
            .body(Body::from(captured.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

fn parse_query(raw: Option<&str>) -> QueryView {
    let Some(raw) = raw else {
        return QueryView::default();
    };
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw).unwrap_or_default();
    let mut values: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        values.entry(key).or_default().push(value);
    }
    QueryView::new(values)
}

fn header_view(headers: &HeaderMap) -> HeaderView {
    HeaderView::from_pairs(headers.iter().map(|(name, value)| {
        (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string())
    }))
}

struct HttpState {
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    disable_recover: bool,
}

async fn dispatch(State(state): State<Arc<HttpState>>, request: Request) -> Response {
    let method = request.method().to_string();
    let uri = request.uri().clone();
    let headers = header_view(request.headers());
    let query = parse_query(uri.query());

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let writer = Arc::new(AxumResponseWriter::default());
    let mut ctx = ExecutionContext::http(state.shutdown.child_token(), method, uri.path(), query, headers, body);
    ctx.store_mut()
        .set::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY, writer.clone());

    let outcome = if state.disable_recover {
        state.pipeline.execute(&mut ctx).await
    } else {
        match AssertUnwindSafe(state.pipeline.execute(&mut ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                let err = RelayError::Http(HttpError::internal("handler panicked"));
                if ctx.mark_committed() {
                    let body = serde_json::json!({ "message": err.message() });
                    let _ = writer.write(500, "application/json", Bytes::from(serde_json::to_vec(&body).unwrap()));
                }
                Err(err)
            }
        }
    };

    if let Err(err) = outcome {
        error!(%err, "request failed");
    }

    // `ctx`'s store holds the other clone of `writer`; drop it so the
    // `Arc` below has exactly one owner left.
    drop(ctx);

    Arc::try_unwrap(writer)
        .unwrap_or_else(|_| unreachable!("writer has exactly one owner after execute() returns"))
        .into_response()
}

/// Builds the axum `Router` mounting the single catch-all route (§4.8).
pub fn build_router(pipeline: Arc<Pipeline>, shutdown: CancellationToken, options: &HttpOptions) -> AxumRouter {
    let state = Arc::new(HttpState {
        pipeline,
        shutdown,
        disable_recover: options.disable_recover,
    });
    AxumRouter::new().fallback(any(dispatch)).with_state(state)
}

/// Binds `options.address` and serves until `shutdown` is cancelled.
pub async fn serve(pipeline: Arc<Pipeline>, shutdown: CancellationToken, options: HttpOptions) -> std::io::Result<()> {
    let router = build_router(pipeline, shutdown.clone(), &options);
    let listener = TcpListener::bind(&options.address).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::container::Container;
    use relay_core::interceptor::InterceptorChain;
    use relay_core::invoker::FnInvoker;
    use relay_core::outcome::ReturnHandlerRegistry;
    use relay_core::resolver::ResolverRegistry;
    use relay_core::router::{HandlerMeta, ParameterMeta, Router};
    use relay_std::{Json, JsonReturnHandler, PathInt};
    use serde::Serialize;
    use std::any::TypeId;
    use tower::ServiceExt;

    struct Users;

    #[derive(Serialize)]
    struct UserBody {
        id: i64,
    }

    async fn get_user(_controller: Arc<Users>, id: PathInt) -> Result<Json<UserBody>, RelayError> {
        Ok(Json(UserBody { id: id.0 }))
    }

    async fn fail(_controller: Arc<Users>) -> Result<Json<UserBody>, RelayError> {
        Err(RelayError::Http(HttpError::bad_request("bad")))
    }

    async fn panics(_controller: Arc<Users>) -> Result<Json<UserBody>, RelayError> {
        panic!("boom")
    }

    fn build_pipeline() -> Arc<Pipeline> {
        let container = Container::new();
        container.register::<Users, _>(|_| Ok(Users));

        let mut resolvers = ResolverRegistry::new();
        relay_std::register_http_builtins(&mut resolvers);

        let mut return_handlers = ReturnHandlerRegistry::new();
        return_handlers.register(JsonReturnHandler);

        let mut router = Router::new();
        router
            .register(
                "GET",
                "/users/:id",
                HandlerMeta {
                    controller_type: TypeId::of::<Users>(),
                    controller_type_name: "Users",
                    parameters: vec![ParameterMeta::for_type::<PathInt>(0)],
                    invoker: Arc::new(FnInvoker::<Users, _, (PathInt,)>::new(get_user)),
                    interceptors: Vec::new(),
                },
            )
            .unwrap();
        router
            .register(
                "GET",
                "/fail",
                HandlerMeta {
                    controller_type: TypeId::of::<Users>(),
                    controller_type_name: "Users",
                    parameters: Vec::new(),
                    invoker: Arc::new(FnInvoker::<Users, _, ()>::new(fail)),
                    interceptors: Vec::new(),
                },
            )
            .unwrap();
        router
            .register(
                "GET",
                "/panic",
                HandlerMeta {
                    controller_type: TypeId::of::<Users>(),
                    controller_type_name: "Users",
                    parameters: Vec::new(),
                    invoker: Arc::new(FnInvoker::<Users, _, ()>::new(panics)),
                    interceptors: Vec::new(),
                },
            )
            .unwrap();

        Arc::new(Pipeline {
            router,
            resolvers,
            return_handlers,
            interceptors: InterceptorChain::new(),
            hooks: Vec::new(),
            container,
        })
    }

    #[tokio::test]
    async fn path_int_resolves_and_json_handler_writes_body() {
        let pipeline = build_pipeline();
        let router = build_router(pipeline, CancellationToken::new(), &HttpOptions::default());

        let request = Request::builder().method("GET").uri("/users/7").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, &b"{\"id\":7}"[..]);
    }

    #[tokio::test]
    async fn http_error_maps_to_status_and_message_body() {
        let pipeline = build_pipeline();
        let router = build_router(pipeline, CancellationToken::new(), &HttpOptions::default());

        let request = Request::builder().method("GET").uri("/fail").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, &b"{\"message\":\"bad\"}"[..]);
    }

    #[tokio::test]
    async fn panic_is_recovered_into_500_by_default() {
        let pipeline = build_pipeline();
        let router = build_router(pipeline, CancellationToken::new(), &HttpOptions::default());

        let request = Request::builder().method("GET").uri("/panic").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unmatched_route_is_a_404_with_uniform_body() {
        let pipeline = build_pipeline();
        let router = build_router(pipeline, CancellationToken::new(), &HttpOptions::default());

        let request = Request::builder().method("GET").uri("/nope").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
