//! # Per-Invocation Execution Context (§3)
//!
//! `ExecutionContext` is the state container threaded through every pipeline
//! stage: argument resolution reads `params`/`query`/`headers` from it,
//! interceptors and handlers stash cross-stage values in its `store`, and the
//! return-value handler writes through whatever `ResponseWriter` the
//! transport bound into it.
//!
//! `WebSocketContext` and `ConsumerContext` (§3) are not separate Rust types
//! layered over `ExecutionContext` — Rust has no interface inheritance — but
//! a single `ExecutionContext` carrying a `Transport` enum for the
//! transport-specific extras (`ConnId`/`MessageType`/`Payload` for
//! WebSocket, `EventName`/`Payload` for consumers). Argument resolvers match
//! on the variant they need and produce a resolution error for the others.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::hook::EventBus;

/// Case-insensitive header accessor, backed by a list of `(name, value)`
/// pairs so multi-valued headers round-trip.
#[derive(Debug, Clone, Default)]
pub struct HeaderView {
    entries: Vec<(String, String)>,
}

impl HeaderView {
    /// Build a view from an iterator of name/value pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Get the first value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value is present for `name`.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

crate::impl_param_binding!(HeaderView);

/// Ordered multi-valued query parameters (`name -> Vec<value>`).
#[derive(Debug, Clone, Default)]
pub struct QueryView {
    values: HashMap<String, Vec<String>>,
}

impl QueryView {
    /// Build from a pre-parsed map.
    pub fn new(values: HashMap<String, Vec<String>>) -> Self {
        Self { values }
    }

    /// The first value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// Whether `key` appears at all (even with zero values).
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The full map.
    pub fn as_map(&self) -> &HashMap<String, Vec<String>> {
        &self.values
    }
}

/// A type-erased, string-keyed store for cross-stage values.
///
/// §3 invariant: "the store must never be shared across requests" — each
/// `ExecutionContext` owns its own `Store`, created fresh per invocation.
#[derive(Default)]
pub struct Store {
    values: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl Store {
    /// Insert a value under `key`, replacing any previous value.
    pub fn set<T: Any + Send>(&mut self, key: &'static str, value: T) {
        self.values.insert(key, Box::new(value));
    }

    /// Borrow the value stored under `key`, if present and of type `T`.
    pub fn get<T: Any + Send>(&self, key: &'static str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrow the value stored under `key`.
    pub fn get_mut<T: Any + Send>(&mut self, key: &'static str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }
}

/// The well-known store key the transport binds its `ResponseWriter` under.
pub const RESPONSE_WRITER_KEY: &str = "relay.response_writer";

/// Transport-specific extras layered onto the common `ExecutionContext`
/// fields (§3: `WebSocketContext`, `ConsumerContext`).
pub enum Transport {
    /// Plain HTTP request; no extras beyond the common fields.
    Http,
    /// A single WebSocket frame on an established connection.
    WebSocket {
        /// Stable per-connection identifier.
        conn_id: String,
        /// The frame's message type (text/binary/ping/... as an integer).
        message_type: i32,
        /// The frame's raw payload.
        payload: Bytes,
        /// Capability to send a frame back on this connection.
        sender: Arc<dyn WsSender>,
    },
    /// A single message read off a broker topic.
    Consumer {
        /// The topic/event name the message arrived on.
        event_name: String,
        /// The raw message payload.
        payload: Bytes,
    },
}

/// Capability carried on a `WebSocketContext` to write a frame back on the
/// connection that produced the inbound message (§3: "a sender capability is
/// carried on the ambient context value channel").
pub trait WsSender: Send + Sync {
    /// Write one frame. `message_type` follows the same encoding as the
    /// inbound frame (e.g. text vs binary).
    fn send(&self, message_type: i32, data: &[u8]) -> Result<(), RelayError>;
}

/// The per-invocation state container threaded through the pipeline (§3).
pub struct ExecutionContext {
    cancellation: CancellationToken,
    method: String,
    path: String,
    params: HashMap<String, String>,
    path_keys: Vec<String>,
    path_cursor: AtomicUsize,
    query: QueryView,
    headers: HeaderView,
    store: Store,
    events: EventBus,
    body: Bytes,
    transport: Transport,
    committed: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Construct a context for an HTTP request.
    pub fn http(
        cancellation: CancellationToken,
        method: impl Into<String>,
        path: impl Into<String>,
        query: QueryView,
        headers: HeaderView,
        body: Bytes,
    ) -> Self {
        Self {
            cancellation,
            method: method.into(),
            path: path.into(),
            params: HashMap::new(),
            path_keys: Vec::new(),
            path_cursor: AtomicUsize::new(0),
            query,
            headers,
            store: Store::default(),
            events: EventBus::default(),
            body,
            transport: Transport::Http,
            committed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Construct a context for one inbound WebSocket frame.
    pub fn websocket(
        cancellation: CancellationToken,
        path: impl Into<String>,
        conn_id: String,
        message_type: i32,
        payload: Bytes,
        sender: Arc<dyn WsSender>,
    ) -> Self {
        Self {
            cancellation,
            method: "WS".to_string(),
            path: path.into(),
            params: HashMap::new(),
            path_keys: Vec::new(),
            path_cursor: AtomicUsize::new(0),
            query: QueryView::default(),
            headers: HeaderView::default(),
            store: Store::default(),
            events: EventBus::default(),
            body: payload.clone(),
            transport: Transport::WebSocket {
                conn_id,
                message_type,
                payload,
                sender,
            },
            committed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Construct a context for one inbound broker message. Method is fixed
    /// to the literal `EVENT` per §3.
    pub fn consumer(cancellation: CancellationToken, event_name: String, payload: Bytes) -> Self {
        Self {
            cancellation,
            method: "EVENT".to_string(),
            path: String::new(),
            params: HashMap::new(),
            path_keys: Vec::new(),
            path_cursor: AtomicUsize::new(0),
            query: QueryView::default(),
            headers: HeaderView::default(),
            store: Store::default(),
            events: EventBus::default(),
            body: payload.clone(),
            transport: Transport::Consumer { event_name, payload },
            committed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The ambient cancellation handle (§5).
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The request method (`GET`, `WS`, `EVENT`, ...).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bind the resolved route's path parameters. Called once by the
    /// pipeline right after a successful route match; read-only afterward
    /// per the §3 invariant.
    pub fn bind_route(&mut self, params: HashMap<String, String>, path_keys: Vec<String>) {
        self.params = params;
        self.path_keys = path_keys;
        self.path_cursor.store(0, Ordering::SeqCst);
    }

    /// The resolved path parameters (empty before routing).
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The ordered path variable names mirroring the matched pattern.
    pub fn path_keys(&self) -> &[String] {
        &self.path_keys
    }

    /// Consume the next unconsumed path key in declaration order, per the
    /// §4.6 step-3 rule that attaches `PathKeys` to the first N path-typed
    /// parameters in the handler's signature.
    pub fn next_path_key(&self) -> Option<String> {
        let i = self.path_cursor.fetch_add(1, Ordering::SeqCst);
        self.path_keys.get(i).cloned()
    }

    /// The query parameters.
    pub fn query(&self) -> &QueryView {
        &self.query
    }

    /// The case-insensitive header view.
    pub fn headers(&self) -> &HeaderView {
        &self.headers
    }

    /// The raw request/message body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The cross-stage store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The cross-stage store, mutably.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// The per-request event bus (§3, §4.7).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The per-request event bus, mutably.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// The transport-specific extras.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Whether the response has already been committed (§4.6 idempotency
    /// invariant).
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    /// Mark the response committed. Returns `false` if it was already
    /// committed (caller must not write again).
    pub fn mark_committed(&self) -> bool {
        !self.committed.swap(true, Ordering::SeqCst)
    }
}
