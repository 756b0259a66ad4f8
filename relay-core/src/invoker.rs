//! # Invoker — typed handler binding over resolved arguments
//!
//! Go's invoker (`internal/invoker/invoker.go`) calls a handler method via
//! `reflect.Value.Call` over a slice of `any`. Rust has no such call; in its
//! place, [`Handler`] is implemented for plain `Fn(Arc<C>, A1, ..., An) ->
//! Fut` closures/fns via a macro over tuple arities, and [`FromResolved`]
//! downcasts each already-resolved `Box<dyn Any + Send>` back to its
//! concrete parameter type. The result is the same "container resolves the
//! controller, registry resolves the arguments, then the call happens" flow,
//! fully type-checked at registration time instead of at call time.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::vec::IntoIter as VecIntoIter;

use crate::container::Container;
use crate::error::RelayError;
use crate::outcome::{IntoOutcome, Outcome};

/// Converts one already-resolved, type-erased argument back into its
/// concrete type. Implemented by every type the `ArgumentResolver` registry
/// can produce (see `relay-std`'s resolver implementations) and by the
/// generic body-binding wrappers (`Json<T>`/`Form<T>`).
pub trait FromResolved: Sized {
    /// Downcast `boxed` to `Self`. An error here means the registered
    /// `ArgumentResolver` produced a value of the wrong type for the
    /// parameter slot it claimed to support — a framework bug, not a user
    /// error, but surfaced the same way since it can only be observed at
    /// runtime.
    fn from_resolved(boxed: Box<dyn Any + Send>) -> Result<Self, RelayError>;
}

/// A handler function over a controller reference and a tuple of resolved
/// argument types, erased to a boxed future producing an [`Outcome`].
pub trait Handler<C, Args>: Clone + Send + Sync + 'static {
    /// Invoke the handler with `controller` and the arguments drained from
    /// `args`, in declaration order.
    fn call(self, controller: Arc<C>, args: VecIntoIter<Box<dyn Any + Send>>) -> Pin<Box<dyn Future<Output = Outcome> + Send>>;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<C, F, Fut, R, $($ty,)*> Handler<C, ($($ty,)*)> for F
        where
            F: Fn(Arc<C>, $($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoOutcome,
            C: Send + Sync + 'static,
            $($ty: FromResolved + Send + 'static,)*
        {
            fn call(self, controller: Arc<C>, mut args: VecIntoIter<Box<dyn Any + Send>>) -> Pin<Box<dyn Future<Output = Outcome> + Send>> {
                $(
                    let $ty = match args.next() {
                        Some(boxed) => match <$ty as FromResolved>::from_resolved(boxed) {
                            Ok(value) => value,
                            Err(err) => return Box::pin(async move { Outcome::Error(err) }),
                        },
                        None => {
                            return Box::pin(async move {
                                Outcome::Error(RelayError::NoResolver { index: 0, type_name: "<missing argument>" })
                            });
                        }
                    };
                )*
                Box::pin(async move { self(controller, $($ty),*).await.into_outcome() })
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Object-safe entry point the [`crate::router::Router`] calls per request:
/// resolve the controller from the container, then invoke the handler over
/// the already-resolved arguments.
pub trait DynInvoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        container: &'a Container,
        args: Vec<Box<dyn Any + Send>>,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;
}

/// Binds a [`Handler`] to its owning controller type `C`, resolved fresh
/// (from the singleton cache) on every invocation.
pub struct FnInvoker<C, F, Args> {
    handler: F,
    _marker: std::marker::PhantomData<fn(C, Args)>,
}

impl<C, F, Args> FnInvoker<C, F, Args> {
    /// Wrap `handler`, to be bound against controller type `C`.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<C, F, Args> DynInvoker for FnInvoker<C, F, Args>
where
    C: Any + Send + Sync + 'static,
    F: Handler<C, Args> + Clone,
    Args: Send + 'static,
{
    fn invoke<'a>(
        &'a self,
        container: &'a Container,
        args: Vec<Box<dyn Any + Send>>,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
        let handler = self.handler.clone();
        let controller = container.resolve::<C>();
        Box::pin(async move {
            let controller = match controller {
                Ok(c) => c,
                Err(e) => return Outcome::Error(e.into()),
            };
            handler.call(controller, args.into_iter()).await
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    struct Noop;

    impl DynInvoker for Noop {
        fn invoke<'a>(
            &'a self,
            _container: &'a Container,
            _args: Vec<Box<dyn Any + Send>>,
        ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
            Box::pin(async { Outcome::Value(Box::new(())) })
        }
    }

    pub(crate) fn noop_invoker() -> Arc<dyn DynInvoker> {
        Arc::new(Noop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter;

    impl FromResolved for String {
        fn from_resolved(boxed: Box<dyn Any + Send>) -> Result<Self, RelayError> {
            boxed
                .downcast::<String>()
                .map(|b| *b)
                .map_err(|_| RelayError::NoResolver { index: 0, type_name: "String" })
        }
    }

    async fn greet(_controller: Arc<Greeter>, name: String) -> Result<String, RelayError> {
        Ok(format!("hello, {name}"))
    }

    #[tokio::test]
    async fn invokes_bound_handler_with_resolved_args() {
        let container = Container::new();
        container.register::<Greeter, _>(|_| Ok(Greeter));
        let invoker: FnInvoker<Greeter, _, (String,)> = FnInvoker::new(greet);
        let args: Vec<Box<dyn Any + Send>> = vec![Box::new("world".to_string())];
        match invoker.invoke(&container, args).await {
            Outcome::Value(v) => assert_eq!(*v.downcast::<String>().unwrap(), "hello, world"),
            Outcome::Error(e) => panic!("unexpected error: {e}"),
        }
    }
}
