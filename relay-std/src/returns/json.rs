//! JSON response (§4.4: "JSON-body (structs/maps/slices)").
//!
//! `Json<T>`'s own [`relay_core::outcome::IntoOutcomeValue`] impl already
//! serialized `T` eagerly, so this handler only ever sees the concrete
//! [`crate::body::SerializedJson`] — it never needs to be generic over `T`
//! itself.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use relay_core::context::{ExecutionContext, RESPONSE_WRITER_KEY};
use relay_core::error::{HttpError, RelayError};
use relay_core::outcome::ReturnValueHandler;
use relay_core::pipeline::ResponseWriter;

use crate::body::SerializedJson;

/// Writes a `Json<T>` return value as a `200 application/json` response.
pub struct JsonReturnHandler;

impl ReturnValueHandler for JsonReturnHandler {
    fn supports(&self, value: &dyn Any) -> bool {
        value.is::<SerializedJson>()
    }

    fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        let serialized = *value.downcast::<SerializedJson>().expect("supports() checked the type");
        let bytes = match serialized {
            SerializedJson::Ok(bytes) => bytes,
            SerializedJson::Err(err) => return Err(err),
        };
        let writer = ctx
            .store()
            .get::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY)
            .cloned()
            .ok_or_else(|| RelayError::Http(HttpError::internal("no ResponseWriter bound into context")))?;
        ctx.mark_committed();
        writer.write(200, "application/json", Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::context::QueryView;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter(Mutex<Option<(u16, String)>>);

    impl ResponseWriter for RecordingWriter {
        fn write(&self, status: u16, _content_type: &str, body: Bytes) -> Result<(), RelayError> {
            *self.0.lock().unwrap() = Some((status, String::from_utf8(body.to_vec()).unwrap()));
            Ok(())
        }
    }

    fn ctx_with_writer() -> (ExecutionContext, Arc<RecordingWriter>) {
        let mut ctx = ExecutionContext::http(
            tokio_util::sync::CancellationToken::new(),
            "GET",
            "/",
            QueryView::default(),
            Default::default(),
            Default::default(),
        );
        let writer = Arc::new(RecordingWriter::default());
        ctx.store_mut().set::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY, writer.clone());
        (ctx, writer)
    }

    #[test]
    fn writes_serialized_json_body() {
        let (mut ctx, writer) = ctx_with_writer();
        JsonReturnHandler
            .handle(Box::new(SerializedJson::Ok(b"{\"ok\":true}".to_vec())), &mut ctx)
            .unwrap();
        let (status, body) = writer.0.lock().unwrap().clone().unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "{\"ok\":true}");
    }

    #[test]
    fn propagates_serialization_failure() {
        let (mut ctx, _writer) = ctx_with_writer();
        let err = JsonReturnHandler
            .handle(Box::new(SerializedJson::Err(RelayError::Http(HttpError::internal("boom")))), &mut ctx)
            .unwrap_err();
        assert_eq!(err.status(), 500);
    }
}
