//! Multipart file upload value types (§4.3: `UploadedFiles`).
//!
//! Transports parse the raw multipart body and stash the parsed files in
//! the context store under [`UPLOADED_FILES_KEY`] before the pipeline
//! resolves arguments; the `UploadedFiles` resolver just reads them back
//! out. Opening a file's content is lazy: the bytes live behind an `Arc` so
//! cloning a descriptor is cheap and the body is only materialized when a
//! handler actually calls `open`.

use std::sync::Arc;

use bytes::Bytes;

/// The context-store key transports bind parsed multipart files under.
pub const UPLOADED_FILES_KEY: &str = "relay.uploaded_files";

/// One uploaded file from a multipart form.
#[derive(Clone)]
pub struct UploadedFile {
    /// The form field name the file was submitted under.
    pub field_name: String,
    /// The client-supplied filename.
    pub filename: String,
    /// Byte length of the file's content.
    pub size: u64,
    /// The part's declared content type, if any.
    pub content_type: Option<String>,
    content: Arc<Bytes>,
}

impl UploadedFile {
    /// Construct a descriptor with its content already in memory.
    pub fn new(field_name: impl Into<String>, filename: impl Into<String>, content_type: Option<String>, content: Bytes) -> Self {
        Self {
            field_name: field_name.into(),
            filename: filename.into(),
            size: content.len() as u64,
            content_type,
            content: Arc::new(content),
        }
    }

    /// Open (materialize) the file's content.
    pub fn open(&self) -> Bytes {
        (*self.content).clone()
    }
}

/// The collected set of uploaded files for one request (§4.3).
#[derive(Clone, Default)]
pub struct UploadedFiles {
    files: Vec<UploadedFile>,
}

impl UploadedFiles {
    /// Wrap a parsed set of files.
    pub fn new(files: Vec<UploadedFile>) -> Self {
        Self { files }
    }

    /// All files submitted under `field_name`.
    pub fn by_field(&self, field_name: &str) -> Vec<&UploadedFile> {
        self.files.iter().filter(|f| f.field_name == field_name).collect()
    }

    /// The first file submitted under `field_name`, if any.
    pub fn first(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    /// Every uploaded file, in submission order.
    pub fn all(&self) -> &[UploadedFile] {
        &self.files
    }
}

relay_core::impl_param_binding!(UploadedFiles);
