//! Redirect response (§4.4: "redirect"). Not present in the handlers this
//! spec was distilled from; modeled after the same "value type plus a
//! dedicated `ReturnValueHandler`" shape as `Binary`.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use relay_core::context::{ExecutionContext, RESPONSE_WRITER_KEY};
use relay_core::error::{HttpError, RelayError};
use relay_core::outcome::{IntoOutcomeValue, ReturnValueHandler};
use relay_core::pipeline::ResponseWriter;

/// A redirect to `location`, `302 Found` by default.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub location: String,
    pub status: u16,
}

impl Redirect {
    /// `302 Found`.
    pub fn found(location: impl Into<String>) -> Self {
        Self { location: location.into(), status: 302 }
    }

    /// `301 Moved Permanently`.
    pub fn permanent(location: impl Into<String>) -> Self {
        Self { location: location.into(), status: 301 }
    }

    /// `303 See Other`.
    pub fn see_other(location: impl Into<String>) -> Self {
        Self { location: location.into(), status: 303 }
    }
}

impl IntoOutcomeValue for Redirect {
    fn into_boxed(self) -> Box<dyn Any + Send> {
        Box::new(self)
    }
}

pub(crate) struct RedirectReturnHandler;

impl ReturnValueHandler for RedirectReturnHandler {
    fn supports(&self, value: &dyn Any) -> bool {
        value.is::<Redirect>()
    }

    fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        let redirect = *value.downcast::<Redirect>().expect("supports() checked the type");
        let writer = ctx
            .store()
            .get::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY)
            .cloned()
            .ok_or_else(|| RelayError::Http(HttpError::internal("no ResponseWriter bound into context")))?;
        writer.set_header("Location", &redirect.location);
        ctx.mark_committed();
        writer.write(redirect.status, "text/plain; charset=utf-8", Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::context::QueryView;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Option<u16>>,
        location: Mutex<Option<String>>,
    }

    impl ResponseWriter for RecordingWriter {
        fn write(&self, status: u16, _content_type: &str, _body: Bytes) -> Result<(), RelayError> {
            *self.written.lock().unwrap() = Some(status);
            Ok(())
        }
        fn set_header(&self, name: &str, value: &str) {
            if name == "Location" {
                *self.location.lock().unwrap() = Some(value.to_string());
            }
        }
    }

    #[test]
    fn found_defaults_to_302_with_location_header() {
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

        RedirectReturnHandler
            .handle(Box::new(Redirect::found("/login")), &mut ctx)
            .unwrap();

        assert_eq!(*writer.written.lock().unwrap(), Some(302));
        assert_eq!(*writer.location.lock().unwrap(), Some("/login".to_string()));
    }
}
