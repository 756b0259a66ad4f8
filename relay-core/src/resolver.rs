//! # ArgumentResolver (§4.3)
//!
//! The registry resolves the framework's *concrete*, non-generic built-in
//! parameter types (ambient context, headers, path values, pagination,
//! query view, uploaded files) by consulting `Supports`/`Resolve` in
//! registration order, exactly as §4.3 specifies. Generic body-binding
//! wrappers (`Json<T>`/`Form<T>`) bypass this registry entirely and are
//! resolved through the compile-time [`ParamBinding::GENERIC_RESOLVE`] path
//! instead — see `SPEC_FULL.md`'s Open Question resolutions for why.

use std::any::Any;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::RelayError;
use crate::router::ParameterMeta;

/// Resolves one declared parameter from the execution context (§4.3).
pub trait ArgumentResolver: Send + Sync {
    /// Whether this resolver knows how to produce a value for `pm`.
    fn supports(&self, pm: &ParameterMeta) -> bool;

    /// Produce the value. Only called when [`Self::supports`] returned
    /// `true` for the same `pm`.
    fn resolve(&self, ctx: &ExecutionContext, pm: &ParameterMeta) -> Result<Box<dyn Any + Send>, RelayError>;
}

/// A parameter type's non-registry resolution path, if any.
///
/// Plain fn pointer rather than a closure: the generic body-binding
/// wrappers (`Json<T>`/`Form<T>`) need no captured state — `T` is already
/// fixed at the call site by monomorphization — so a fn pointer is both
/// sufficient and `Copy`, letting `ParameterMeta` stay cheaply cloneable.
pub type GenericResolveFn = fn(&ExecutionContext) -> Option<Result<Box<dyn Any + Send>, RelayError>>;

/// Implemented by every type that can appear as a handler parameter.
///
/// Built-in concrete types (headers, path values, pagination, ...) rely on
/// the default: `GENERIC_RESOLVE` is `None`, so the pipeline resolves them
/// through the [`ResolverRegistry`] exactly as §4.3 describes. Generic
/// body-binding wrappers override it with a monomorphized resolution
/// function, bypassing the registry (Open Question resolution #3 in
/// `SPEC_FULL.md`).
pub trait ParamBinding: Any + Send + 'static {
    /// `None` to use the `ArgumentResolver` registry; `Some(f)` to resolve
    /// via `f` instead.
    const GENERIC_RESOLVE: Option<GenericResolveFn> = None;

    /// Whether this type consumes the next unconsumed path key (§4.6 step
    /// 3). Only `relay_std`'s `PathInt`/`PathString`/`PathBoolean` override
    /// this to `Path`; every other built-in and user DTO is `Other`.
    const KIND: crate::router::ParameterKind = crate::router::ParameterKind::Other;
}

/// Implements [`ParamBinding`] (with its defaults) and [`crate::invoker::FromResolved`]
/// for a handler-parameter type that is always produced, and only ever
/// consumed, as a plain boxed value of its own concrete type — true of every
/// built-in resolver output (§4.3) except the generic body-binding wrappers,
/// which implement both traits by hand.
#[macro_export]
macro_rules! impl_param_binding {
    ($ty:ty) => {
        impl $crate::resolver::ParamBinding for $ty {}

        impl $crate::invoker::FromResolved for $ty {
            fn from_resolved(boxed: ::std::boxed::Box<dyn ::std::any::Any + ::std::marker::Send>) -> ::std::result::Result<Self, $crate::error::RelayError> {
                boxed.downcast::<$ty>().map(|b| *b).map_err(|_| {
                    $crate::error::RelayError::Http($crate::error::HttpError::internal(concat!(
                        "resolved value was not the expected ",
                        stringify!($ty)
                    )))
                })
            }
        }
    };
}

/// Implements just the [`crate::invoker::FromResolved`] half of
/// [`impl_param_binding!`], for types that need a non-default
/// [`ParamBinding::KIND`] (the `PathInt`/`PathString`/`PathBoolean` trio).
#[macro_export]
macro_rules! impl_from_resolved {
    ($ty:ty) => {
        impl $crate::invoker::FromResolved for $ty {
            fn from_resolved(boxed: ::std::boxed::Box<dyn ::std::any::Any + ::std::marker::Send>) -> ::std::result::Result<Self, $crate::error::RelayError> {
                boxed.downcast::<$ty>().map(|b| *b).map_err(|_| {
                    $crate::error::RelayError::Http($crate::error::HttpError::internal(concat!(
                        "resolved value was not the expected ",
                        stringify!($ty)
                    )))
                })
            }
        }
    };
}

/// An ordered registry of resolvers, consulted first-match-wins (§4.3).
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver. Registration order is priority order: earlier
    /// resolvers are tried first.
    pub fn register(&mut self, resolver: impl ArgumentResolver + 'static) -> &mut Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Resolve `pm` against the registered resolvers, in order.
    pub fn resolve(&self, ctx: &ExecutionContext, pm: &ParameterMeta) -> Result<Box<dyn Any + Send>, RelayError> {
        for resolver in &self.resolvers {
            if resolver.supports(pm) {
                return resolver.resolve(ctx, pm);
            }
        }
        Err(RelayError::NoResolver {
            index: pm.index,
            type_name: pm.type_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryView;
    use crate::router::ParameterKind;
    use std::any::TypeId;

    struct AlwaysFortyTwo;

    impl ArgumentResolver for AlwaysFortyTwo {
        fn supports(&self, pm: &ParameterMeta) -> bool {
            pm.type_id == TypeId::of::<i64>()
        }
        fn resolve(&self, _ctx: &ExecutionContext, _pm: &ParameterMeta) -> Result<Box<dyn Any + Send>, RelayError> {
            Ok(Box::new(42_i64))
        }
    }

    fn pm() -> ParameterMeta {
        ParameterMeta {
            index: 0,
            type_name: "i64",
            type_id: TypeId::of::<i64>(),
            kind: ParameterKind::Other,
            generic_resolve: None,
        }
    }

    #[test]
    fn first_registered_resolver_wins() {
        let mut registry = ResolverRegistry::new();
        registry.register(AlwaysFortyTwo);
        let ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        let value = registry.resolve(&ctx, &pm()).unwrap();
        assert_eq!(*value.downcast::<i64>().unwrap(), 42);
    }

    #[test]
    fn missing_resolver_is_an_error() {
        let registry = ResolverRegistry::new();
        let ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        let err = registry.resolve(&ctx, &pm()).unwrap_err();
        assert!(matches!(err, RelayError::NoResolver { .. }));
    }
}
