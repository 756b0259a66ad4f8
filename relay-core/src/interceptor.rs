//! # Interceptor (§4.5)
//!
//! Ordering is the load-bearing part of this module: `PreHandle` runs
//! forward, `PostHandle` and `AfterCompletion` run in reverse, and
//! `AfterCompletion` always runs exactly once per interceptor regardless of
//! how the invocation ended.

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::RelayError;
use crate::router::HandlerMeta;

/// Sentinel carried by a `PreHandle` error to mean "the response has already
/// been written; stop the chain cleanly, without surfacing an error"
/// (§4.5).
#[derive(Debug)]
pub struct Abort;

impl std::fmt::Display for Abort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interceptor chain aborted")
    }
}

impl std::error::Error for Abort {}

/// Cross-cutting logic that wraps handler invocation (§4.5).
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// A stable type identity used to deduplicate global interceptors by
    /// concrete type (§4.5: "deduplicated by concrete type").
    fn type_id(&self) -> TypeId;

    /// Runs before argument resolution's results reach the handler. An
    /// `Err` containing [`Abort`] ends the chain cleanly; any other `Err`
    /// ends it and propagates.
    async fn pre_handle(&self, ctx: &mut ExecutionContext, meta: &HandlerMeta) -> Result<(), RelayError>;

    /// Runs in reverse order, only when invocation and return-handling both
    /// succeeded.
    async fn post_handle(&self, ctx: &mut ExecutionContext, meta: &HandlerMeta);

    /// Runs in reverse order on every exit path, carrying the final error
    /// if any.
    async fn after_completion(&self, ctx: &mut ExecutionContext, meta: &HandlerMeta, err: Option<&RelayError>);
}

/// Object-safe twin of [`Interceptor`] for storage in `Vec<Arc<dyn ...>>`.
pub trait DynInterceptor: Send + Sync {
    fn type_id_dyn(&self) -> TypeId;

    fn pre_handle<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RelayError>> + Send + 'a>>;

    fn post_handle<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;

    fn after_completion<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
        err: Option<&'a RelayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
}

impl<I: Interceptor> DynInterceptor for I {
    fn type_id_dyn(&self) -> TypeId {
        Interceptor::type_id(self)
    }

    fn pre_handle<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RelayError>> + Send + 'a>> {
        Box::pin(Interceptor::pre_handle(self, ctx, meta))
    }

    fn post_handle<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(Interceptor::post_handle(self, ctx, meta))
    }

    fn after_completion<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        meta: &'a HandlerMeta,
        err: Option<&'a RelayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(Interceptor::after_completion(self, ctx, meta, err))
    }
}

/// An ordered, deduplicated set of global interceptors plus, per
/// invocation, a route's scoped interceptors appended after them (§4.5:
/// "global interceptors ... followed by the HandlerMeta's route-scoped
/// interceptors").
#[derive(Clone, Default)]
pub struct InterceptorChain {
    global: Vec<Arc<dyn DynInterceptor>>,
}

impl InterceptorChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a global interceptor. A later registration whose concrete
    /// type already appears in the chain is silently dropped
    /// (first-registration-wins, §4.5).
    pub fn register(&mut self, interceptor: Arc<dyn DynInterceptor>) -> &mut Self {
        let type_id = interceptor.type_id_dyn();
        if self.global.iter().any(|i| i.type_id_dyn() == type_id) {
            return self;
        }
        self.global.push(interceptor);
        self
    }

    /// Build the effective per-invocation chain: globals followed by the
    /// route's own scoped interceptors.
    pub fn effective(&self, route_scoped: &[Arc<dyn DynInterceptor>]) -> Vec<Arc<dyn DynInterceptor>> {
        let mut chain = self.global.clone();
        chain.extend(route_scoped.iter().cloned());
        chain
    }
}

/// Outcome of running the `PreHandle` half of the chain (§4.5).
pub enum PreOutcome {
    /// Every interceptor's `PreHandle` ran without error; proceed to
    /// invocation.
    Continue,
    /// An interceptor aborted cleanly; the response is already written.
    Aborted,
    /// An interceptor failed with a real error; propagate it.
    Failed(RelayError),
}

/// Run the `PreHandle` half of an effective chain in order (§4.5).
pub async fn run_pre_handle(
    chain: &[Arc<dyn DynInterceptor>],
    ctx: &mut ExecutionContext,
    meta: &HandlerMeta,
) -> PreOutcome {
    for interceptor in chain.iter() {
        match interceptor.pre_handle(ctx, meta).await {
            Ok(()) => continue,
            Err(RelayError::Other(boxed)) if boxed.downcast_ref::<Abort>().is_some() => {
                return PreOutcome::Aborted;
            }
            Err(other) => return PreOutcome::Failed(other),
        }
    }
    PreOutcome::Continue
}

/// Run the `PostHandle` half of the chain in reverse order (§4.5).
pub async fn run_post_handle(chain: &[Arc<dyn DynInterceptor>], ctx: &mut ExecutionContext, meta: &HandlerMeta) {
    for interceptor in chain.iter().rev() {
        interceptor.post_handle(ctx, meta).await;
    }
}

/// Run `AfterCompletion` in reverse order over the *entire* effective chain
/// (§4.5: "`AfterCompletion` does run in reverse order for every
/// interceptor whose Pre was reached or not" — it is installed as a
/// deferred callback over the whole chain the moment the chain is composed,
/// independent of how far `PreHandle` got).
pub async fn run_after_completion(
    chain: &[Arc<dyn DynInterceptor>],
    ctx: &mut ExecutionContext,
    meta: &HandlerMeta,
    err: Option<&RelayError>,
) {
    for interceptor in chain.iter().rev() {
        interceptor.after_completion(ctx, meta, err).await;
    }
}
