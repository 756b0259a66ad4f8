//! Built-in WebSocket `ArgumentResolver`s (§4.3: "WebSocket and consumer
//! transports use a distinct resolver set").

use std::any::TypeId;

use relay_core::context::{ExecutionContext, Transport};
use relay_core::error::{HttpError, RelayError};
use relay_core::resolver::ArgumentResolver;
use relay_core::router::ParameterMeta;

/// The stable per-connection identifier (§3: `ConnID`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConnId(pub String);

/// The inbound frame's raw payload.
#[derive(Debug, Clone)]
pub struct WsPayload(pub bytes::Bytes);

fn websocket_extras(ctx: &ExecutionContext) -> Result<(&str, i32, &bytes::Bytes), RelayError> {
    match ctx.transport() {
        Transport::WebSocket {
            conn_id, message_type, payload, ..
        } => Ok((conn_id.as_str(), *message_type, payload)),
        _ => Err(RelayError::Http(HttpError::internal(
            "WebSocket parameter resolved outside a WebSocket invocation",
        ))),
    }
}

pub struct WsConnIdResolver;

impl ArgumentResolver for WsConnIdResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<WsConnId>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let (conn_id, ..) = websocket_extras(ctx)?;
        Ok(Box::new(WsConnId(conn_id.to_string())))
    }
}

relay_core::impl_param_binding!(WsConnId);
relay_core::impl_param_binding!(WsPayload);

pub struct WsPayloadResolver;

impl ArgumentResolver for WsPayloadResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<WsPayload>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let (_, _, payload) = websocket_extras(ctx)?;
        Ok(Box::new(WsPayload(payload.clone())))
    }
}
