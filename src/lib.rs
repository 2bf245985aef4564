//! # axum-tus
//!
//! Server side of the [tus resumable upload protocol][1] (`1.0.0`) for
//! [`axum`][2], with the `creation` and `termination` extensions.
//!
//! Fully generic, storage is any type implementing the [`UploadStore`]
//! trait. [`MemoryStore`] keeps uploads in memory and is mostly useful for
//! tests and demos.
//!
//! The handler keeps no state between requests. Every request re-reads the
//! upload from the store, so the store alone decides what exists and what
//! its offset is.
//!
//! ```
//! use axum::Router;
//! use axum_tus::{Configuration, MemoryStore};
//!
//! # async fn run() {
//! let configuration = Configuration::builder(MemoryStore::new())
//!     .base_path("/files")
//!     .build();
//!
//! let app: Router = Router::new().nest_service("/files", axum_tus::router(configuration));
//! # let _ = app;
//! # }
//! ```
//!
//! Requests are answered as follows:
//!
//! | Method | Success | Failures |
//! |---|---|---|
//! | `OPTIONS` | 204 | |
//! | `POST` | 201 with `Location` | 400, 501 |
//! | `HEAD` | 200 with `upload-offset`, `upload-length`, `upload-metadata` | 400, 404 |
//! | `PATCH` | 204 with `upload-offset` | 400, 404, 409, 415 |
//! | `DELETE` | 204 | 404 |
//!
//! Any other method, and any request carrying `x-http-method-override`, is
//! answered with 501. Failures raised by the store go through the configured
//! error formatter instead.
//!
//! [1]: https://tus.io/protocols/resumable-upload
//! [2]: https://docs.rs/axum

mod config;
mod error;
mod handler;
mod location;
mod memory;
mod store;
mod stream;

pub mod header;

use std::sync::Arc;

use axum::Router;

pub use config::{Configuration, ConfigurationBuilder, CreateUid, FormatErrorResponse, Options};
pub use error::{default_error_response, Error, ErrorResponse};
pub use handler::handle;
pub use header::{decode_metadata_header, encode_metadata_header, Metadata};
pub use location::{build_location, extract_identifier, relative_path};
pub use memory::MemoryStore;
pub use store::{NewUpload, Upload, UploadStore};
pub use stream::UploadStream;

/// Router answering every path with the tus handler.
///
/// The configured base path is stripped from inbound paths before the
/// upload identifier is read, so the router works both at the root and when
/// nested under the base path.
pub fn router(configuration: Configuration) -> Router {
    Router::new()
        .fallback(handler::handle_state)
        .with_state(Arc::new(configuration))
}
