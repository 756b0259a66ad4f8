//! Generic body-binding wrappers (§4.3: `Json[T]`/`Form[T]` in the original
//! Go generics, resolved by type switch there). Rust has no runtime generics
//! to switch on, so each wrapper resolves itself through
//! [`ParamBinding::GENERIC_RESOLVE`] instead of the `ArgumentResolver`
//! registry (Open Question resolution #3 in `SPEC_FULL.md`): the resolution
//! function is monomorphized per `T` at the handler's call site, so it knows
//! exactly how to deserialize without any registry lookup.
//!
//! The same trick runs in reverse for return values: `Json<T>` serializes
//! itself eagerly, while `T` is still in scope, into a concrete
//! [`SerializedJson`] that a non-generic [`crate::returns::json::JsonReturnHandler`]
//! can downcast.

use std::any::Any;

use relay_core::context::ExecutionContext;
use relay_core::error::{HttpError, RelayError};
use relay_core::invoker::FromResolved;
use relay_core::outcome::IntoOutcomeValue;
use relay_core::resolver::{GenericResolveFn, ParamBinding};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A JSON-decoded request body, or a JSON-encoded response body.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + Send + 'static> ParamBinding for Json<T> {
    const GENERIC_RESOLVE: Option<GenericResolveFn> = Some(resolve_json::<T>);
}

impl<T: Send + 'static> FromResolved for Json<T> {
    fn from_resolved(boxed: Box<dyn Any + Send>) -> Result<Self, RelayError> {
        boxed
            .downcast::<Json<T>>()
            .map(|b| *b)
            .map_err(|_| RelayError::Http(HttpError::internal("resolved value was not the expected JSON body")))
    }
}

fn resolve_json<T: DeserializeOwned + Send + 'static>(
    ctx: &ExecutionContext,
) -> Option<Result<Box<dyn Any + Send>, RelayError>> {
    let parsed = serde_json::from_slice::<T>(ctx.body()).map(|value| Box::new(Json(value)) as Box<dyn Any + Send>);
    Some(parsed.map_err(|err| RelayError::Http(HttpError::bad_request(format!("invalid JSON body: {err}")))))
}

/// A JSON response body, already serialized at the point `T` was known.
/// Serialization can fail (non-JSON-representable types), so the result
/// carries its own error rather than relying on `into_boxed`'s infallible
/// signature.
pub(crate) enum SerializedJson {
    Ok(Vec<u8>),
    Err(RelayError),
}

impl<T: Serialize + Send + 'static> IntoOutcomeValue for Json<T> {
    fn into_boxed(self) -> Box<dyn Any + Send> {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Box::new(SerializedJson::Ok(bytes)),
            Err(err) => Box::new(SerializedJson::Err(RelayError::Http(HttpError::internal(format!(
                "failed to serialize JSON response: {err}"
            ))))),
        }
    }
}

/// A form (`application/x-www-form-urlencoded`)-decoded request body.
#[derive(Debug, Clone)]
pub struct Form<T>(pub T);

impl<T> Form<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + Send + 'static> ParamBinding for Form<T> {
    const GENERIC_RESOLVE: Option<GenericResolveFn> = Some(resolve_form::<T>);
}

impl<T: Send + 'static> FromResolved for Form<T> {
    fn from_resolved(boxed: Box<dyn Any + Send>) -> Result<Self, RelayError> {
        boxed
            .downcast::<Form<T>>()
            .map(|b| *b)
            .map_err(|_| RelayError::Http(HttpError::internal("resolved value was not the expected form body")))
    }
}

fn resolve_form<T: DeserializeOwned + Send + 'static>(
    ctx: &ExecutionContext,
) -> Option<Result<Box<dyn Any + Send>, RelayError>> {
    let parsed = serde_urlencoded::from_bytes::<T>(ctx.body()).map(|value| Box::new(Form(value)) as Box<dyn Any + Send>);
    Some(parsed.map_err(|err| RelayError::Http(HttpError::bad_request(format!("invalid form body: {err}")))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::context::QueryView;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Payload {
        name: String,
        age: u32,
    }

    fn ctx_with_body(body: &'static [u8]) -> ExecutionContext {
        ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "POST",
            "/",
            QueryView::default(),
            Default::default(),
            bytes::Bytes::from_static(body),
        )
    }

    #[test]
    fn json_resolves_matching_payload() {
        let ctx = ctx_with_body(br#"{"name":"ada","age":36}"#);
        let resolved = resolve_json::<Payload>(&ctx).unwrap().unwrap();
        let Json(payload) = *resolved.downcast::<Json<Payload>>().unwrap();
        assert_eq!(payload, Payload { name: "ada".into(), age: 36 });
    }

    #[test]
    fn json_rejects_malformed_payload() {
        let ctx = ctx_with_body(b"not json");
        let err = resolve_json::<Payload>(&ctx).unwrap().unwrap_err();
        assert!(matches!(err, RelayError::Http(_)));
    }

    #[test]
    fn form_resolves_encoded_payload() {
        let ctx = ctx_with_body(b"name=ada&age=36");
        let resolved = resolve_form::<Payload>(&ctx).unwrap().unwrap();
        let Form(payload) = *resolved.downcast::<Form<Payload>>().unwrap();
        assert_eq!(payload, Payload { name: "ada".into(), age: 36 });
    }

    #[test]
    fn json_return_value_serializes_eagerly() {
        let boxed = Json(Payload { name: "ada".into(), age: 36 }).into_boxed();
        let serialized = boxed.downcast::<SerializedJson>().unwrap();
        match *serialized {
            SerializedJson::Ok(bytes) => {
                assert_eq!(bytes, serde_json::to_vec(&Payload { name: "ada".into(), age: 36 }).unwrap());
            }
            SerializedJson::Err(_) => panic!("expected successful serialization"),
        }
    }
}
