//! Binary response (§4.4: "binary (bytes + content-type + options)"),
//! grounded in `internal/handler/binary_return_handler.go`: custom headers,
//! `Set-Cookie` emission, and an explicit status default to 200.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use relay_core::context::{ExecutionContext, RESPONSE_WRITER_KEY};
use relay_core::error::{HttpError, RelayError};
use relay_core::outcome::{IntoOutcomeValue, ReturnValueHandler};
use relay_core::pipeline::ResponseWriter;

/// One `Set-Cookie` attribute set. Only the fields the original handler
/// serializes are modeled; anything more elaborate (SameSite, Secure, ...)
/// belongs on a dedicated cookie-jar type if a future need arises.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    fn serialize(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={path}"));
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Per-response options accompanying a [`Binary`] return value.
#[derive(Debug, Clone, Default)]
pub struct BinaryOptions {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
}

/// A raw-bytes response with an explicit content type (§4.4).
#[derive(Debug, Clone)]
pub struct Binary {
    pub data: Bytes,
    pub content_type: String,
    pub options: BinaryOptions,
}

impl Binary {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            options: BinaryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BinaryOptions) -> Self {
        self.options = options;
        self
    }
}

impl IntoOutcomeValue for Binary {
    fn into_boxed(self) -> Box<dyn Any + Send> {
        Box::new(self)
    }
}

pub(crate) struct BinaryReturnHandler;

impl ReturnValueHandler for BinaryReturnHandler {
    fn supports(&self, value: &dyn Any) -> bool {
        value.is::<Binary>()
    }

    fn handle(&self, value: Box<dyn Any + Send>, ctx: &mut ExecutionContext) -> Result<(), RelayError> {
        let binary = *value.downcast::<Binary>().expect("supports() checked the type");
        let writer = ctx
            .store()
            .get::<Arc<dyn ResponseWriter>>(RESPONSE_WRITER_KEY)
            .cloned()
            .ok_or_else(|| RelayError::Http(HttpError::internal("no ResponseWriter bound into context")))?;

        for (name, value) in &binary.options.headers {
            writer.set_header(name, value);
        }
        for cookie in &binary.options.cookies {
            writer.add_header("Set-Cookie", &cookie.serialize());
        }

        let status = if binary.options.status == 0 { 200 } else { binary.options.status };
        ctx.mark_committed();
        writer.write(status, &binary.content_type, binary.data)
    }
}
