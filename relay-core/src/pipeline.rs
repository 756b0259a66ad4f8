//! # Execution Pipeline (§4.6)

use std::any::Any;

use bytes::Bytes;
use tracing::{error, warn};

use crate::container::Container;
use crate::context::{ExecutionContext, RESPONSE_WRITER_KEY};
use crate::error::{HttpError, RelayError, RoutingError};
use crate::hook::DynPostExecutionHook;
use crate::interceptor::{run_after_completion, run_post_handle, run_pre_handle, InterceptorChain, PreOutcome};
use crate::outcome::{Outcome, ReturnHandlerRegistry};
use crate::resolver::ResolverRegistry;
use crate::router::Router;

/// Writes the transport-appropriate response for one invocation. Bound into
/// the context store under [`RESPONSE_WRITER_KEY`] by the transport before
/// the pipeline runs.
pub trait ResponseWriter: Send + Sync {
    /// Write `body` as the response with `status` and `content_type`. Called
    /// at most once per request in practice, but implementations should
    /// tolerate being asked to write twice without panicking — the pipeline
    /// guards against it with [`ExecutionContext::mark_committed`], but a
    /// transport driving the writer directly (e.g. a handler using
    /// `relay_std::Binary`) relies on the same guard.
    fn write(&self, status: u16, content_type: &str, body: Bytes) -> Result<(), RelayError>;

    /// Set (overwrite) a response header. Default no-op for writers that
    /// don't expose header control.
    fn set_header(&self, _name: &str, _value: &str) {}

    /// Append a response header without overwriting an existing one with
    /// the same name (used for repeatable headers like `Set-Cookie`).
    /// Default no-op for writers that don't expose header control.
    fn add_header(&self, _name: &str, _value: &str) {}
}

/// The fully assembled set of framework collaborators the pipeline needs
/// for one invocation. Transports own one of these (usually behind an
/// `Arc`) and hand out a fresh [`ExecutionContext`] per request.
pub struct Pipeline {
    pub router: Router,
    pub resolvers: ResolverRegistry,
    pub return_handlers: ReturnHandlerRegistry,
    pub interceptors: InterceptorChain,
    pub hooks: Vec<std::sync::Arc<dyn DynPostExecutionHook>>,
    pub container: Container,
}

impl Pipeline {
    /// Run the full §4.6 lifecycle for one request.
    pub async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();

        // Step 1: resolve handler via the router.
        let (meta, params, path_keys) = match self.router.match_route(&method, &path) {
            Ok(found) => found,
            Err(RoutingError::NotFound { method, path }) => {
                let err = RelayError::Routing(RoutingError::NotFound { method, path });
                self.commit_error(ctx, &err);
                return Err(err);
            }
            Err(other) => {
                let err = RelayError::Routing(other);
                self.commit_error(ctx, &err);
                return Err(err);
            }
        };

        ctx.bind_route(params, path_keys);

        // Step 2: compose the effective interceptor chain.
        let chain = self.interceptors.effective(&meta.interceptors);

        // Step 4: resolve arguments (step 3's PathKeys attachment already
        // happened via `bind_route`; individual path resolvers consume keys
        // through `ExecutionContext::next_path_key`).
        let mut args: Vec<Box<dyn Any + Send>> = Vec::with_capacity(meta.parameters.len());
        for pm in &meta.parameters {
            let resolved = match pm.generic_resolve.and_then(|f| f(ctx)) {
                Some(result) => result,
                None => self.resolvers.resolve(ctx, pm),
            };
            match resolved {
                Ok(value) => args.push(value),
                Err(err) => {
                    self.commit_error(ctx, &err);
                    run_after_completion(&chain, ctx, meta, Some(&err)).await;
                    return Err(err);
                }
            }
        }

        // Step 5: PreHandle.
        let pre_outcome = run_pre_handle(&chain, ctx, meta).await;
        match pre_outcome {
            PreOutcome::Continue => {}
            PreOutcome::Aborted => {
                run_after_completion(&chain, ctx, meta, None).await;
                return Ok(());
            }
            PreOutcome::Failed(err) => {
                self.commit_error(ctx, &err);
                run_after_completion(&chain, ctx, meta, Some(&err)).await;
                return Err(err);
            }
        }

        // Step 6: invoke.
        let outcome = meta.invoker.invoke(&self.container, args).await;

        // Step 7: return-value handling.
        let handling_result = match outcome {
            Outcome::Value(value) => self.return_handlers.handle(value, ctx),
            Outcome::Error(err) => Err(err),
        };

        // Step 8: post-execution hooks, regardless of outcome.
        for hook in &self.hooks {
            hook.run(ctx, &handling_result).await;
        }

        // Step 9.
        match handling_result {
            Ok(()) => {
                run_post_handle(&chain, ctx, meta).await;
                run_after_completion(&chain, ctx, meta, None).await;
                Ok(())
            }
            Err(err) => {
                self.commit_error(ctx, &err);
                run_after_completion(&chain, ctx, meta, Some(&err)).await;
                Err(err)
            }
        }
    }

    /// Uniform error mapping (§4.6): write a JSON `{"message": ...}` body
    /// with the error's status, unless the response was already committed.
    /// Idempotent by construction via [`ExecutionContext::mark_committed`].
    fn commit_error(&self, ctx: &mut ExecutionContext, err: &RelayError) {
        if !ctx.mark_committed() {
            warn!(error = %err, "response already committed; dropping error mapping");
            return;
        }
        let Some(writer) = ctx.store().get::<std::sync::Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY) else {
            error!(error = %err, "no ResponseWriter bound into context; cannot write error response");
            return;
        };
        let status = err.status();
        let body = serde_json::json!({ "message": err.message() });
        let encoded = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(encode_err) => {
                error!(error = %encode_err, "failed to encode error response body");
                return;
            }
        };
        if let Err(write_err) = writer.write(status, "application/json", Bytes::from(encoded)) {
            error!(error = %write_err, "failed to write error response");
        }
    }
}

/// Build an [`HttpError`]-flavored [`RelayError`] for ad hoc use by
/// transports before a `Pipeline` is available (e.g. rejecting a malformed
/// WebSocket upgrade).
pub fn http_error(status: u16, message: impl Into<String>) -> RelayError {
    RelayError::Http(HttpError::new(status, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryView;
    use crate::invoker::FnInvoker;
    use crate::outcome::ReturnValueHandler;
    use crate::router::HandlerMeta;
    use std::any::TypeId;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Option<(u16, String)>>,
    }

    impl ResponseWriter for RecordingWriter {
        fn write(&self, status: u16, _content_type: &str, body: Bytes) -> Result<(), RelayError> {
            *self.written.lock().unwrap() = Some((status, String::from_utf8(body.to_vec()).unwrap()));
            Ok(())
        }
    }

    struct StringHandler;

    impl ReturnValueHandler for StringHandler {
        fn supports(&self, value: &dyn Any) -> bool {
            value.is::<String>()
        }
        fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
            let s = *value.downcast::<String>().unwrap();
            let writer = ctx
                .store()
                .get::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY)
                .cloned()
                .expect("writer bound");
            ctx.mark_committed();
            writer.write(200, "text/plain", Bytes::from(s))
        }
    }

    struct Controller;

    async fn handle(_controller: Arc<Controller>) -> Result<String, RelayError> {
        Ok("ok".to_string())
    }

    fn build_pipeline() -> Pipeline {
        let mut router = Router::new();
        let container = Container::new();
        container.register::<Controller, _>(|_| Ok(Controller));

        let invoker: FnInvoker<Controller, _, ()> = FnInvoker::new(handle);
        router
            .register(
                "GET",
                "/greet",
                HandlerMeta {
                    controller_type: TypeId::of::<Controller>(),
                    controller_type_name: "Controller",
                    parameters: Vec::new(),
                    invoker: Arc::new(invoker),
                    interceptors: Vec::new(),
                },
            )
            .unwrap();

        let mut return_handlers = ReturnHandlerRegistry::new();
        return_handlers.register(StringHandler);

        Pipeline {
            router,
            resolvers: ResolverRegistry::new(),
            return_handlers,
            interceptors: InterceptorChain::new(),
            hooks: Vec::new(),
            container,
        }
    }

    fn ctx_with_writer(method: &str, path: &str) -> (ExecutionContext, Arc<RecordingWriter>) {
        let mut ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            method,
            path,
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        let writer = Arc::new(RecordingWriter::default());
        ctx.store_mut()
            .set::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY, writer.clone());
        (ctx, writer)
    }

    #[tokio::test]
    async fn happy_path_writes_response_through_return_handler() {
        let pipeline = build_pipeline();
        let (mut ctx, writer) = ctx_with_writer("GET", "/greet");

        pipeline.execute(&mut ctx).await.unwrap();

        let (status, body) = writer.written.lock().unwrap().clone().unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn routing_miss_maps_to_uniform_json_error() {
        let pipeline = build_pipeline();
        let (mut ctx, writer) = ctx_with_writer("GET", "/nope");

        let err = pipeline.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.status(), 404);

        let (status, body) = writer.written.lock().unwrap().clone().unwrap();
        assert_eq!(status, 404);
        assert!(body.contains("no route matches"));
    }
}
