use std::io;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;

use crate::header::TusResumable;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every way a tus request can fail.
///
/// The protocol variants (`NotFound` through `UnsupportedMediaType`) are
/// answered with a fixed status code. `User` and `Store` are handed to the
/// configured [`format_error_response`](crate::ConfigurationBuilder::format_error_response).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("upload not found")]
    NotFound,

    #[error("upload-offset {received} does not match current offset {expected}")]
    Conflict { expected: u64, received: u64 },

    #[error("{0} is not implemented")]
    UnsupportedExtension(&'static str),

    #[error("invalid {name} header: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("content-type must be application/offset+octet-stream")]
    UnsupportedMediaType,

    /// A failure a store or callback reports deliberately, e.g. a rejected
    /// upload.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    Store(BoxError),
}

impl Error {
    /// Wraps any error raised by a store implementation.
    pub fn store<E: Into<BoxError>>(error: E) -> Self {
        Error::Store(error.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        Error::User(message.into())
    }

    pub(crate) fn invalid_header(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidHeader { name, reason: reason.into() }
    }

    /// The fixed status of a protocol error, `None` for errors that belong
    /// to the formatter.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::NotFound => Some(StatusCode::NOT_FOUND),
            Error::Conflict { .. } => Some(StatusCode::CONFLICT),
            Error::UnsupportedExtension(_) => Some(StatusCode::NOT_IMPLEMENTED),
            Error::InvalidHeader { .. } => Some(StatusCode::BAD_REQUEST),
            Error::UnsupportedMediaType => Some(StatusCode::UNSUPPORTED_MEDIA_TYPE),
            Error::User(_) | Error::Store(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Store(Box::new(error))
    }
}

/// Response produced by an error formatter. Implements [`IntoResponse`].
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ErrorResponse {
    pub fn new(status_code: StatusCode, body: impl Into<String>) -> Self {
        ErrorResponse { status_code, headers: HeaderMap::new(), body: body.into() }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code, self.headers, self.body).into_response()
    }
}

/// Formatter used when none is configured.
pub fn default_error_response(_error: &Error) -> ErrorResponse {
    ErrorResponse::new(StatusCode::BAD_REQUEST, "Request cannot be processed.")
}

/// How a failed request is answered.
#[derive(Debug)]
pub(crate) enum Rejection {
    /// Detected by the state machine itself.
    Protocol(Error),
    /// Raised by a store or callback, answered by the formatter.
    Delegated(Error),
}

impl From<Error> for Rejection {
    fn from(error: Error) -> Self {
        Rejection::Protocol(error)
    }
}

impl Rejection {
    /// `NotFound` from a lookup keeps its 404, anything else is delegated.
    pub(crate) fn lookup(error: Error) -> Self {
        match error {
            Error::NotFound => Rejection::Protocol(Error::NotFound),
            other => Rejection::Delegated(other),
        }
    }

    /// A conflict from an append is the store's offset check losing a race.
    pub(crate) fn append(error: Error) -> Self {
        match error {
            error @ Error::Conflict { .. } => Rejection::Protocol(error),
            other => Rejection::Delegated(other),
        }
    }

    pub(crate) fn respond(self, format: impl Fn(&Error) -> ErrorResponse) -> Response {
        match self {
            Rejection::Protocol(error) => match error.status() {
                Some(status) => {
                    tracing::debug!(%status, %error, "rejecting request");
                    fixed_response(status)
                }
                None => delegate(&error, format),
            },
            Rejection::Delegated(error) => delegate(&error, format),
        }
    }
}

fn fixed_response(status: StatusCode) -> Response {
    let body = if status == StatusCode::NOT_IMPLEMENTED { "Not implemented." } else { "" };
    (status, TypedHeader(TusResumable), body).into_response()
}

fn delegate(error: &Error, format: impl Fn(&Error) -> ErrorResponse) -> Response {
    tracing::warn!(%error, "request failed, formatting error response");
    format(error).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn unauthorized(_: &Error) -> ErrorResponse {
        ErrorResponse::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    #[test]
    fn test_protocol_statuses() {
        assert_eq!(Some(StatusCode::NOT_FOUND), Error::NotFound.status());
        assert_eq!(Some(StatusCode::CONFLICT), Error::Conflict { expected: 0, received: 50 }.status());
        assert_eq!(Some(StatusCode::NOT_IMPLEMENTED), Error::UnsupportedExtension("creation-defer-length").status());
        assert_eq!(Some(StatusCode::BAD_REQUEST), Error::invalid_header("upload-offset", "missing").status());
        assert_eq!(Some(StatusCode::UNSUPPORTED_MEDIA_TYPE), Error::UnsupportedMediaType.status());
        assert_eq!(None, Error::user("nope").status());
        assert_eq!(None, Error::store(io::Error::other("disk")).status());
    }

    #[tokio::test]
    async fn test_not_implemented_has_fixed_body() {
        let response = Rejection::from(Error::UnsupportedExtension("x-http-method-override"))
            .respond(unauthorized);
        assert_eq!(StatusCode::NOT_IMPLEMENTED, response.status());
        assert_eq!("Not implemented.", body_string(response).await);
    }

    #[tokio::test]
    async fn test_conflict_bypasses_formatter() {
        let response = Rejection::from(Error::Conflict { expected: 0, received: 50 }).respond(unauthorized);
        assert_eq!(StatusCode::CONFLICT, response.status());
        assert_eq!("1.0.0", response.headers()["tus-resumable"]);
        assert_eq!("", body_string(response).await);
    }

    #[tokio::test]
    async fn test_delegated_uses_formatter() {
        let response = Rejection::Delegated(Error::NotFound).respond(unauthorized);
        assert_eq!(StatusCode::UNAUTHORIZED, response.status());
        assert_eq!("Unauthorized", body_string(response).await);
    }

    #[tokio::test]
    async fn test_default_formatter() {
        let response = Rejection::from(Error::user("foo")).respond(default_error_response);
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        assert_eq!("Request cannot be processed.", body_string(response).await);
    }

    #[test]
    fn test_lookup_keeps_not_found_only() {
        assert!(matches!(Rejection::lookup(Error::NotFound), Rejection::Protocol(Error::NotFound)));
        assert!(matches!(Rejection::lookup(Error::UnsupportedMediaType), Rejection::Delegated(_)));
        assert!(matches!(Rejection::append(Error::Conflict { expected: 1, received: 0 }), Rejection::Protocol(_)));
        assert!(matches!(Rejection::append(Error::NotFound), Rejection::Delegated(_)));
    }
}
