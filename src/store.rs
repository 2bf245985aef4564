use async_trait::async_trait;
use axum::http::request::Parts;

use crate::{Error, Metadata, UploadStream};

/// State of one upload as reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upload {
    /// Total number of bytes the upload will contain.
    pub length: u64,
    /// Number of bytes received so far.
    pub offset: u64,
    pub metadata: Metadata,
}

/// Everything known about an upload at creation time.
#[derive(Debug)]
pub struct NewUpload {
    /// Identifier chosen by the configured generator.
    pub uid: String,
    /// Head of the POST request that created the upload.
    pub request: Parts,
    pub upload_length: u64,
    pub upload_metadata: Metadata,
}

/// Storage backing the protocol handler.
///
/// A store owns upload state entirely, the handler looks every upload up
/// again on each request. Implementations must make the offset check and
/// the append in [`UploadStore::upload`] atomic per identifier.
///
/// # Object Safety
///
/// This trait is object-safe, configurations hold an `Arc<dyn UploadStore>`.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Looks an upload up. Returns [`Error::NotFound`] if it does not exist.
    async fn get_upload(&self, uid: &str) -> Result<Upload, Error>;

    /// Appends `body` at `offset` and returns the new offset.
    ///
    /// Returns [`Error::Conflict`] if `offset` no longer matches the stored
    /// offset by the time the append starts.
    async fn upload(&self, uid: &str, offset: u64, body: UploadStream) -> Result<u64, Error>;

    /// Called once per POST after the identifier has been generated.
    async fn create_upload(&self, _upload: NewUpload) -> Result<(), Error> {
        Ok(())
    }

    /// Removes an upload.
    async fn delete(&self, _uid: &str) -> Result<(), Error> {
        Err(Error::UnsupportedExtension("termination"))
    }
}
