//! A request-logging interceptor.

use std::any::TypeId;

use async_trait::async_trait;
use relay_core::context::ExecutionContext;
use relay_core::error::RelayError;
use relay_core::interceptor::Interceptor;
use relay_core::router::HandlerMeta;

/// Logs one line per invocation stage via `tracing`. Registered as a global
/// interceptor, it wraps every route.
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    async fn pre_handle(&self, ctx: &mut ExecutionContext, meta: &HandlerMeta) -> Result<(), RelayError> {
        tracing::info!(method = ctx.method(), path = ctx.path(), controller = meta.controller_type_name, "dispatching");
        Ok(())
    }

    async fn post_handle(&self, ctx: &mut ExecutionContext, _meta: &HandlerMeta) {
        tracing::debug!(method = ctx.method(), path = ctx.path(), "handled");
    }

    async fn after_completion(&self, ctx: &mut ExecutionContext, _meta: &HandlerMeta, err: Option<&RelayError>) {
        match err {
            Some(err) => tracing::warn!(method = ctx.method(), path = ctx.path(), %err, "completed with error"),
            None => tracing::debug!(method = ctx.method(), path = ctx.path(), "completed"),
        }
    }
}
