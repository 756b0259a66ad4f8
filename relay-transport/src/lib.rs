//! Transport runtimes (§4.8, §4.9, §6): HTTP, WebSocket, and broker consumer
//! adapters that drive a [`relay_core::pipeline::Pipeline`] from the outside
//! world.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub mod websocket;

pub mod consumer;

#[cfg(feature = "http")]
pub use http::{HttpOptions, build_router, serve as serve_http};

#[cfg(feature = "http")]
pub use websocket::{WebSocketOptions, WebSocketRuntime};

pub use consumer::{ConsumerRuntime, Reader};
