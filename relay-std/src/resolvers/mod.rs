//! Built-in `ArgumentResolver` implementations (§4.3).

pub mod consumer;
pub mod http;
pub mod ws;

use relay_core::resolver::ResolverRegistry;

/// Register every built-in resolver that doesn't depend on which transport
/// is active. HTTP-only controllers additionally want [`ws`] or [`consumer`]
/// resolvers only when they declare those parameter types, so those two
/// modules are registered by their respective transport runtimes instead of
/// here.
pub fn register_http_builtins(registry: &mut ResolverRegistry) {
    registry.register(http::StdContextResolver);
    registry.register(http::HeaderResolver);
    registry.register(http::PathValueResolver);
    registry.register(http::PaginationResolver);
    registry.register(http::QueryValuesResolver);
    registry.register(http::UploadedFilesResolver);
}

/// Register the WebSocket-specific resolvers (§4.3).
pub fn register_websocket_builtins(registry: &mut ResolverRegistry) {
    registry.register(ws::WsConnIdResolver);
    registry.register(ws::WsPayloadResolver);
}

/// Register the consumer-specific resolvers (§4.3).
pub fn register_consumer_builtins(registry: &mut ResolverRegistry) {
    registry.register(consumer::ConsumerEventNameResolver);
    registry.register(consumer::ConsumerPayloadResolver);
}
