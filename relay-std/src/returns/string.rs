//! Plain-text response (§4.4: "string-body").

use std::any::Any;

use bytes::Bytes;
use relay_core::context::{ExecutionContext, RESPONSE_WRITER_KEY};
use relay_core::error::{HttpError, RelayError};
use relay_core::outcome::ReturnValueHandler;
use relay_core::pipeline::ResponseWriter;
use std::sync::Arc;

/// Writes a `String` return value as a `200 text/plain` response.
pub struct StringReturnHandler;

impl ReturnValueHandler for StringReturnHandler {
    fn supports(&self, value: &dyn Any) -> bool {
        value.is::<String>()
    }

    fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        let body = *value.downcast::<String>().expect("supports() checked the type");
        let writer = ctx
            .store()
            .get::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY)
            .cloned()
            .ok_or_else(|| RelayError::Http(HttpError::internal("no ResponseWriter bound into context")))?;
        ctx.mark_committed();
        writer.write(200, "text/plain; charset=utf-8", Bytes::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::context::QueryView;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter(Mutex<Option<(u16, String, String)>>);

    impl ResponseWriter for RecordingWriter {
        fn write(&self, status: u16, content_type: &str, body: Bytes) -> Result<(), RelayError> {
            *self.0.lock().unwrap() = Some((status, content_type.to_string(), String::from_utf8(body.to_vec()).unwrap()));
            Ok(())
        }
    }

    #[test]
    fn writes_string_as_plain_text() {
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

        StringReturnHandler.handle(Box::new("hi".to_string()), &mut ctx).unwrap();

        let (status, content_type, body) = writer.0.lock().unwrap().clone().unwrap();
        assert_eq!(status, 200);
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert_eq!(body, "hi");
    }
}
