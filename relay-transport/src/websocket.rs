//! WebSocket runtime (§4.9): one task per connection, a shared connection
//! registry keyed by a generated id, and a stop-once shutdown latch that
//! closes every tracked connection with a normal-closure frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router as AxumRouter;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use relay_core::context::{ExecutionContext, WsSender};
use relay_core::error::RelayError;
use relay_core::pipeline::{Pipeline, ResponseWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// WebSocket close status code for a clean, expected shutdown (§4.9).
const NORMAL_CLOSURE: u16 = 1000;
/// WebSocket close status code sent when a handler returns an error (§4.9, §6).
const INTERNAL_ERROR: u16 = 1011;

/// A `ResponseWriter` is still bound into the context per the pipeline's
/// contract even though WebSocket handlers typically return through the
/// socket's send capability rather than a committed HTTP-shaped response;
/// this one discards writes (a handler that tries to use it gets a no-op).
struct NullResponseWriter;

impl ResponseWriter for NullResponseWriter {
    fn write(&self, _status: u16, _content_type: &str, _body: Bytes) -> Result<(), RelayError> {
        Ok(())
    }
}

struct ChannelSender {
    outbox: mpsc::UnboundedSender<Message>,
}

impl WsSender for ChannelSender {
    fn send(&self, message_type: i32, data: &[u8]) -> Result<(), RelayError> {
        let message = if message_type == 2 {
            Message::Binary(Bytes::copy_from_slice(data))
        } else {
            Message::Text(String::from_utf8_lossy(data).into_owned().into())
        };
        self.outbox
            .send(message)
            .map_err(|_| RelayError::Http(relay_core::error::HttpError::internal("connection closed")))
    }
}

#[derive(Clone, Default)]
pub struct WebSocketOptions {}

struct Connection {
    outbox: mpsc::UnboundedSender<Message>,
}

/// Tracks live connections so graceful shutdown can close every one of them.
#[derive(Clone)]
pub struct WebSocketRuntime {
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
    stopping: Arc<std::sync::atomic::AtomicBool>,
}

impl WebSocketRuntime {
    pub fn new(pipeline: Arc<Pipeline>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            shutdown,
            connections: Arc::new(Mutex::new(HashMap::new())),
            stopping: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Mounts a `GET` upgrade route at `path` (axum's `:param` syntax).
    ///
    /// Takes a router still scoped to this runtime's own state rather than
    /// an already-`with_state`'d one, since the upgrade handler's `State`
    /// extractor needs `Arc<WebSocketRuntime>`, not whatever state an HTTP
    /// router built elsewhere has already resolved to. Callers mounting
    /// several paths build one `AxumRouter::<Arc<WebSocketRuntime>>::new()`
    /// per path and `.merge()` the resulting (fully resolved) routers
    /// together, along with the HTTP catch-all router.
    pub fn register(self: &Arc<Self>, router: AxumRouter<Arc<Self>>, path: &str) -> AxumRouter {
        router.route(path, get(upgrade)).with_state(self.clone())
    }

    /// Sends a 1000 (normal closure) frame to every tracked connection and
    /// stops accepting new ones. Idempotent.
    pub async fn stop(&self) {
        if self.stopping.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let connections = self.connections.lock().unwrap();
        for (id, conn) in connections.iter() {
            let frame = Message::Close(Some(CloseFrame {
                code: NORMAL_CLOSURE,
                reason: Utf8Bytes::from_static(""),
            }));
            if conn.outbox.send(frame).is_err() {
                debug!(conn_id = %id, "connection already gone at shutdown");
            }
        }
    }

    fn track(&self, id: String, outbox: mpsc::UnboundedSender<Message>) -> bool {
        if self.stopping.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        self.connections.lock().unwrap().insert(id, Connection { outbox });
        true
    }

    fn untrack(&self, id: &str) {
        self.connections.lock().unwrap().remove(id);
    }
}

async fn upgrade(
    State(runtime): State<Arc<WebSocketRuntime>>,
    Path(path): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(runtime, path, socket))
}

async fn handle_connection(runtime: Arc<WebSocketRuntime>, path: String, socket: WebSocket) {
    let conn_id = Uuid::new_v4().simple().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    if !runtime.track(conn_id.clone(), tx.clone()) {
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    let sender: Arc<dyn WsSender> = Arc::new(ChannelSender { outbox: tx.clone() });

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = runtime.shutdown.cancelled() => break,
        };

        let Some(frame) = frame else { break };
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "read error, terminating connection");
                break;
            }
        };

        let (message_type, payload) = match message {
            Message::Text(text) => (1, Bytes::from(text.as_str().as_bytes().to_vec())),
            Message::Binary(data) => (2, data),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let mut ctx = ExecutionContext::websocket(
            runtime.shutdown.child_token(),
            path.clone(),
            conn_id.clone(),
            message_type,
            payload,
            sender.clone(),
        );
        ctx.store_mut().set::<Arc<dyn ResponseWriter>>(
            relay_core::context::RESPONSE_WRITER_KEY,
            Arc::new(NullResponseWriter),
        );

        if !dispatch_frame(&runtime.pipeline, &mut ctx, &tx, &conn_id).await {
            break;
        }
    }

    runtime.untrack(&conn_id);
    drop(tx);
    let _ = writer_task.await;
}

/// Runs one resolved frame's context through the pipeline, sending an
/// internal-error (1011) close frame on failure (§4.9, §6). Returns `false`
/// when the caller should stop reading further frames from this connection.
async fn dispatch_frame(
    pipeline: &Pipeline,
    ctx: &mut ExecutionContext,
    tx: &mpsc::UnboundedSender<Message>,
    conn_id: &str,
) -> bool {
    if let Err(err) = pipeline.execute(ctx).await {
        warn!(conn_id = %conn_id, error = %err, "handler error, closing connection");
        let frame = Message::Close(Some(CloseFrame {
            code: INTERNAL_ERROR,
            reason: Utf8Bytes::from_static("handler error"),
        }));
        let _ = tx.send(frame);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::container::Container;
    use relay_core::interceptor::InterceptorChain;
    use relay_core::outcome::ReturnHandlerRegistry;
    use relay_core::invoker::FnInvoker;
    use relay_core::resolver::{ArgumentResolver, ResolverRegistry};
    use relay_core::router::{HandlerMeta, ParameterMeta, Router};
    use relay_std::resolvers::ws::{WsConnId, WsConnIdResolver};
    use std::any::TypeId;

    struct MuteSender;

    impl WsSender for MuteSender {
        fn send(&self, _message_type: i32, _data: &[u8]) -> Result<(), RelayError> {
            Ok(())
        }
    }

    fn empty_runtime() -> Arc<WebSocketRuntime> {
        let pipeline = Arc::new(Pipeline {
            router: Router::new(),
            resolvers: ResolverRegistry::new(),
            return_handlers: ReturnHandlerRegistry::new(),
            interceptors: InterceptorChain::new(),
            hooks: Vec::new(),
            container: Container::new(),
        });
        Arc::new(WebSocketRuntime::new(pipeline, CancellationToken::new()))
    }

    #[tokio::test]
    async fn stop_sends_a_normal_closure_frame_to_every_tracked_connection() {
        let runtime = empty_runtime();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(runtime.track("conn-1".to_string(), tx));

        runtime.stop().await;

        match rx.recv().await.expect("a close frame was sent") {
            Message::Close(Some(frame)) => assert_eq!(frame.code, NORMAL_CLOSURE),
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_rejects_further_tracking() {
        let runtime = empty_runtime();
        runtime.stop().await;
        runtime.stop().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!runtime.track("late-comer".to_string(), tx));
    }

    #[tokio::test]
    async fn two_frames_on_one_connection_resolve_the_same_conn_id() {
        let resolver = WsConnIdResolver;
        let pm = ParameterMeta::for_type::<WsConnId>(0);
        let sender: Arc<dyn WsSender> = Arc::new(MuteSender);

        let first = ExecutionContext::websocket(
            CancellationToken::new(),
            "/chat",
            "conn-7".to_string(),
            1,
            Bytes::from_static(b"hello"),
            sender.clone(),
        );
        let second = ExecutionContext::websocket(
            CancellationToken::new(),
            "/chat",
            "conn-7".to_string(),
            1,
            Bytes::from_static(b"world"),
            sender,
        );

        let a = *resolver.resolve(&first, &pm).unwrap().downcast::<WsConnId>().unwrap();
        let b = *resolver.resolve(&second, &pm).unwrap().downcast::<WsConnId>().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, WsConnId("conn-7".to_string()));
    }

    struct FailingController;

    async fn always_fails(_controller: Arc<FailingController>) -> Result<(), RelayError> {
        Err(RelayError::Http(relay_core::error::HttpError::internal("boom")))
    }

    #[tokio::test]
    async fn a_failing_handler_closes_with_an_internal_error_frame() {
        let container = Container::new();
        container.register::<FailingController, _>(|_| Ok(FailingController));

        let mut router = Router::new();
        router
            .register(
                "WS",
                "/chat",
                HandlerMeta {
                    controller_type: TypeId::of::<FailingController>(),
                    controller_type_name: "FailingController",
                    parameters: Vec::new(),
                    invoker: Arc::new(FnInvoker::<FailingController, _, ()>::new(always_fails)),
                    interceptors: Vec::new(),
                },
            )
            .unwrap();

        let pipeline = Pipeline {
            router,
            resolvers: ResolverRegistry::new(),
            return_handlers: ReturnHandlerRegistry::new(),
            interceptors: InterceptorChain::new(),
            hooks: Vec::new(),
            container,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender: Arc<dyn WsSender> = Arc::new(MuteSender);
        let mut ctx = ExecutionContext::websocket(
            CancellationToken::new(),
            "/chat",
            "conn-9".to_string(),
            1,
            Bytes::from_static(b"hello"),
            sender,
        );

        let should_continue = dispatch_frame(&pipeline, &mut ctx, &tx, "conn-9").await;
        assert!(!should_continue);

        match rx.recv().await.expect("a close frame was sent") {
            Message::Close(Some(frame)) => assert_eq!(frame.code, INTERNAL_ERROR),
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}
