//! Built-in consumer `ArgumentResolver`s (§4.3).

use std::any::TypeId;

use relay_core::context::{ExecutionContext, Transport};
use relay_core::error::{HttpError, RelayError};
use relay_core::resolver::ArgumentResolver;
use relay_core::router::ParameterMeta;

/// The topic/event name a consumer message arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerEventName(pub String);

/// The raw message payload.
#[derive(Debug, Clone)]
pub struct ConsumerPayload(pub bytes::Bytes);

fn consumer_extras(ctx: &ExecutionContext) -> Result<(&str, &bytes::Bytes), RelayError> {
    match ctx.transport() {
        Transport::Consumer { event_name, payload } => Ok((event_name.as_str(), payload)),
        _ => Err(RelayError::Http(HttpError::internal(
            "consumer parameter resolved outside a consumer invocation",
        ))),
    }
}

relay_core::impl_param_binding!(ConsumerEventName);
relay_core::impl_param_binding!(ConsumerPayload);

pub struct ConsumerEventNameResolver;

impl ArgumentResolver for ConsumerEventNameResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<ConsumerEventName>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let (event_name, _) = consumer_extras(ctx)?;
        Ok(Box::new(ConsumerEventName(event_name.to_string())))
    }
}

pub struct ConsumerPayloadResolver;

impl ArgumentResolver for ConsumerPayloadResolver {
    fn supports(&self, pm: &ParameterMeta) -> bool {
        pm.type_id == TypeId::of::<ConsumerPayload>()
    }

    fn resolve(&self, ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn std::any::Any + Send>, RelayError> {
        let (_, payload) = consumer_extras(ctx)?;
        Ok(Box::new(ConsumerPayload(payload.clone())))
    }
}
