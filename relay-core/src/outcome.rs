//! # Outcome / ReturnValueHandler (§4.4)
//!
//! Go's handlers return `(value, error)` tuples and the framework picks the
//! first non-nil value by reflection. Rust's `Result<T, E>` already encodes
//! "error takes priority, else the value" at the type level (Open Question
//! resolution #2), so a handler's return type need only implement
//! [`IntoOutcome`] to plug into the same dispatch machinery: the error arm
//! is mapped by the pipeline's uniform error mapping (§4.6), and the value
//! arm is dispatched to the first supporting [`ReturnValueHandler`].

use std::any::Any;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::RelayError;

/// The type-erased result of invoking a handler: either a successful value
/// ready for return-value dispatch, or an error destined for the pipeline's
/// uniform error mapping.
pub enum Outcome {
    /// A non-error return value, boxed for downcasting by a
    /// [`ReturnValueHandler`].
    Value(Box<dyn Any + Send>),
    /// The handler failed; no return-value handler runs.
    Error(RelayError),
}

/// Converts a handler's native return type into an [`Outcome`]. Implemented
/// for `Result<T, E>` for any `T: IntoOutcomeValue` and any `E:
/// Into<RelayError>`, which covers ordinary handler signatures without
/// requiring handler authors to think about `Outcome` directly.
pub trait IntoOutcome {
    /// Erase `self` into an [`Outcome`].
    fn into_outcome(self) -> Outcome;
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcomeValue,
    E: Into<RelayError>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(value) => Outcome::Value(value.into_boxed()),
            Err(err) => Outcome::Error(err.into()),
        }
    }
}

/// A concrete type a handler is allowed to return. There is deliberately no
/// blanket impl over all `T: Any + Send`: a handler's return type names its
/// own binding intent (`String`, `Json<MyDto>`, `Binary`, ...) instead of the
/// framework inferring how to serialize an arbitrary struct by reflection,
/// the way the original Go framework does.
///
/// Wrapper types that carry a generic payload (`Json<T>`) implement this by
/// serializing eagerly, at the point where `T` is still known, into a
/// concrete value a [`ReturnValueHandler`] can downcast without itself being
/// generic over `T`.
pub trait IntoOutcomeValue: Send + 'static {
    /// Box `self` for [`Outcome::Value`].
    fn into_boxed(self) -> Box<dyn Any + Send>;
}

impl IntoOutcomeValue for String {
    fn into_boxed(self) -> Box<dyn Any + Send> {
        Box::new(self)
    }
}

impl IntoOutcomeValue for () {
    fn into_boxed(self) -> Box<dyn Any + Send> {
        Box::new(self)
    }
}

/// Dispatches one successful return value to a transport-appropriate
/// response (§4.4).
pub trait ReturnValueHandler: Send + Sync {
    /// Whether this handler knows how to write `value`'s concrete type.
    fn supports(&self, value: &dyn Any) -> bool;

    /// Write the response. Only called when [`Self::supports`] returned
    /// `true` for the same value.
    fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError>;
}

/// An ordered registry of return-value handlers, consulted first-match-wins
/// (§4.4).
#[derive(Clone, Default)]
pub struct ReturnHandlerRegistry {
    handlers: Vec<Arc<dyn ReturnValueHandler>>,
}

impl ReturnHandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Registration order is priority order.
    pub fn register(&mut self, handler: impl ReturnValueHandler + 'static) -> &mut Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Dispatch `value` to the first supporting handler.
    pub fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        for handler in &self.handlers {
            if handler.supports(value.as_ref()) {
                return handler.handle(value, ctx);
            }
        }
        Err(RelayError::NoReturnHandler {
            type_name: "<unregistered return type>",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryView;

    #[test]
    fn ok_becomes_value_outcome() {
        let outcome: Outcome = Ok::<_, RelayError>("hello".to_string()).into_outcome();
        assert!(matches!(outcome, Outcome::Value(_)));
    }

    #[test]
    fn err_becomes_error_outcome() {
        let outcome: Outcome =
            Err::<String, _>(crate::error::HttpError::not_found("nope")).into_outcome();
        assert!(matches!(outcome, Outcome::Error(_)));
    }

    struct StringHandler;

    impl ReturnValueHandler for StringHandler {
        fn supports(&self, value: &dyn Any) -> bool {
            value.is::<String>()
        }
        fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
            let s = *value.downcast::<String>().unwrap();
            ctx.store_mut().set("written_body", s);
            Ok(())
        }
    }

    #[test]
    fn dispatches_to_first_supporting_handler() {
        let mut registry = ReturnHandlerRegistry::new();
        registry.register(StringHandler);
        let mut ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        registry
            .handle(Box::new("hello".to_string()), &mut ctx)
            .unwrap();
        assert_eq!(ctx.store().get::<String>("written_body").unwrap(), "hello");
    }

    #[test]
    fn unmatched_value_is_an_error() {
        let registry = ReturnHandlerRegistry::new();
        let mut ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        let err = registry.handle(Box::new(7_u8), &mut ctx).unwrap_err();
        assert!(matches!(err, RelayError::NoReturnHandler { .. }));
    }
}
