//! Turns a typed handler function into the metadata the router and pipeline
//! need (§4.2, §9 "Runtime-reflected dispatch"). Go gets there by reflecting
//! over the handler's declared signature at registration time; there is no
//! such reflection here, so [`ParamList`] is implemented once per argument
//! tuple arity (mirroring `relay_core::invoker`'s `Handler` impls) and
//! produces the same [`ParameterMeta`] list `ParameterMeta::for_type` would
//! if it could see the whole signature at once.

use std::sync::Arc;

use relay_core::interceptor::DynInterceptor;
use relay_core::resolver::ParamBinding;
use relay_core::router::ParameterMeta;

/// Route-scoped interceptors attached to one `Route`/`WebSocket().Register`
/// call, appended after the global chain (§4.5).
pub type RouteInterceptors = Vec<Arc<dyn DynInterceptor>>;

/// A handler's argument tuple, known at compile time. Produces the
/// [`ParameterMeta`] list the router attaches to a `HandlerMeta` — one entry
/// per declared parameter, in declaration order.
pub trait ParamList {
    /// Build the parameter descriptors for this argument tuple.
    fn metas() -> Vec<ParameterMeta>;
}

macro_rules! impl_param_list {
    () => {
        impl ParamList for () {
            fn metas() -> Vec<ParameterMeta> {
                Vec::new()
            }
        }
    };
    ($($ty:ident : $idx:expr),+ $(,)?) => {
        impl<$($ty: ParamBinding),+> ParamList for ($($ty,)+) {
            fn metas() -> Vec<ParameterMeta> {
                vec![$(ParameterMeta::for_type::<$ty>($idx)),+]
            }
        }
    };
}

impl_param_list!();
impl_param_list!(A1: 0);
impl_param_list!(A1: 0, A2: 1);
impl_param_list!(A1: 0, A2: 1, A3: 2);
impl_param_list!(A1: 0, A2: 1, A3: 2, A4: 3);
impl_param_list!(A1: 0, A2: 1, A3: 2, A4: 3, A5: 4);
impl_param_list!(A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5);
impl_param_list!(A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5, A7: 6);
impl_param_list!(A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5, A7: 6, A8: 7);

#[cfg(test)]
mod tests {
    use super::*;
    use relay_std::{Pagination, PathInt};
    use std::any::TypeId;

    #[test]
    fn empty_tuple_has_no_parameters() {
        assert!(<()>::metas().is_empty());
    }

    #[test]
    fn tuple_metas_preserve_declaration_order() {
        let metas = <(PathInt, Pagination)>::metas();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].index, 0);
        assert_eq!(metas[0].type_id, TypeId::of::<PathInt>());
        assert_eq!(metas[1].index, 1);
        assert_eq!(metas[1].type_id, TypeId::of::<Pagination>());
    }
}
