use std::sync::Arc;

use axum::extract::{OriginalUri, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;

use crate::error::Rejection;
use crate::header::{
    decode_metadata_header, parse_length_header, parse_offset_header, Metadata, TusExtension,
    TusResumable, TusVersion, UploadLength, UploadMetadata, UploadOffset, OFFSET_OCTET_STREAM,
    TUS_RESUMABLE, UPLOAD_DEFER_LENGTH, UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
    X_HTTP_METHOD_OVERRIDE,
};
use crate::location::{build_location, extract_identifier, relative_path};
use crate::{Configuration, Error, NewUpload, UploadStream};

/// Answers one tus request.
///
/// Never fails: every error is turned into a response, either a fixed
/// protocol status or whatever the configured formatter returns.
pub async fn handle(configuration: &Configuration, request: Request) -> Response {
    tracing::debug!(method = %request.method(), path = %request.uri().path(), "tus request");

    match dispatch(configuration, request).await {
        Ok(response) => response,
        Err(rejection) => rejection.respond(|error| configuration.format_error_response(error)),
    }
}

pub(crate) async fn handle_state(
    State(configuration): State<Arc<Configuration>>,
    request: Request,
) -> Response {
    handle(&configuration, request).await
}

async fn dispatch(configuration: &Configuration, request: Request) -> Result<Response, Rejection> {
    if request.headers().contains_key(&X_HTTP_METHOD_OVERRIDE) {
        return Err(Error::UnsupportedExtension("x-http-method-override").into());
    }

    match *request.method() {
        Method::OPTIONS => Ok(options()),
        Method::POST => create(configuration, request).await,
        Method::HEAD => status(configuration, request).await,
        Method::PATCH => append(configuration, request).await,
        Method::DELETE => terminate(configuration, request).await,
        _ => Err(Error::UnsupportedExtension("method").into()),
    }
}

fn options() -> Response {
    (
        StatusCode::NO_CONTENT,
        TypedHeader(TusResumable),
        TypedHeader(TusVersion),
        TypedHeader(TusExtension),
    )
        .into_response()
}

async fn create(configuration: &Configuration, request: Request) -> Result<Response, Rejection> {
    let (parts, _body) = request.into_parts();

    reject_deferred_length(&parts.headers)?;
    require_tus_resumable(&parts.headers)?;
    let upload_length = parse_length_header(parts.headers.get(&UPLOAD_LENGTH))?;
    let upload_metadata = metadata(&parts.headers)?;

    let uid = configuration.create_uid();
    let location = build_location(configuration.base_path(), &uid);
    let location = HeaderValue::try_from(location)
        .map_err(|_| Rejection::Delegated(Error::user(format!("identifier {:?} is not a valid path", uid))))?;

    configuration
        .store()
        .create_upload(NewUpload { uid: uid.clone(), request: parts, upload_length, upload_metadata })
        .await
        .map_err(Rejection::Delegated)?;

    tracing::info!(%uid, upload_length, "created upload");
    Ok((StatusCode::CREATED, TypedHeader(TusResumable), [(LOCATION, location)]).into_response())
}

async fn status(configuration: &Configuration, request: Request) -> Result<Response, Rejection> {
    let uid = identifier(configuration, request.uri(), request.extensions())?;
    require_tus_resumable(request.headers())?;

    let upload = configuration.store().get_upload(uid).await.map_err(Rejection::lookup)?;
    Ok((
        StatusCode::OK,
        TypedHeader(TusResumable),
        TypedHeader(UploadLength(upload.length)),
        TypedHeader(UploadOffset(upload.offset)),
        TypedHeader(UploadMetadata(upload.metadata)),
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
    )
        .into_response())
}

async fn append(configuration: &Configuration, request: Request) -> Result<Response, Rejection> {
    let (parts, body) = request.into_parts();

    require_offset_octet_stream(&parts.headers)?;
    let offset = parse_offset_header(parts.headers.get(&UPLOAD_OFFSET))?;
    let uid = identifier(configuration, &parts.uri, &parts.extensions)?;

    let upload = configuration.store().get_upload(uid).await.map_err(Rejection::lookup)?;
    if offset != upload.offset {
        return Err(Error::Conflict { expected: upload.offset, received: offset }.into());
    }

    let body = UploadStream::new(body, upload.length.saturating_sub(upload.offset));
    let offset = configuration
        .store()
        .upload(uid, offset, body)
        .await
        .map_err(Rejection::append)?;

    Ok((StatusCode::NO_CONTENT, TypedHeader(TusResumable), TypedHeader(UploadOffset(offset))).into_response())
}

async fn terminate(configuration: &Configuration, request: Request) -> Result<Response, Rejection> {
    let uid = identifier(configuration, request.uri(), request.extensions())?;

    configuration.store().get_upload(uid).await.map_err(Rejection::lookup)?;
    // a concurrent DELETE may remove the upload between the two calls
    configuration.store().delete(uid).await.map_err(Rejection::lookup)?;

    tracing::info!(%uid, "terminated upload");
    Ok((StatusCode::NO_CONTENT, TypedHeader(TusResumable)).into_response())
}

// Under `nest_service` the request URI has lost its prefix already, the
// original URI still carries the base path.
fn identifier<'u>(configuration: &Configuration, uri: &'u Uri, extensions: &'u Extensions) -> Result<&'u str, Error> {
    let path = extensions.get::<OriginalUri>().map_or(uri.path(), |OriginalUri(original)| original.path());
    extract_identifier(relative_path(configuration.base_path(), path))
}

fn reject_deferred_length(headers: &HeaderMap) -> Result<(), Error> {
    if headers.contains_key(&UPLOAD_DEFER_LENGTH) {
        return Err(Error::UnsupportedExtension("creation-defer-length"));
    }
    Ok(())
}

fn require_tus_resumable(headers: &HeaderMap) -> Result<(), Error> {
    if !headers.contains_key(&TUS_RESUMABLE) {
        return Err(Error::invalid_header("tus-resumable", "missing"));
    }
    Ok(())
}

fn require_offset_octet_stream(headers: &HeaderMap) -> Result<(), Error> {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim);

    match media_type {
        Some(media_type) if media_type.eq_ignore_ascii_case(OFFSET_OCTET_STREAM) => Ok(()),
        _ => Err(Error::UnsupportedMediaType),
    }
}

fn metadata(headers: &HeaderMap) -> Result<Metadata, Error> {
    match headers.get(&UPLOAD_METADATA) {
        Some(raw) => {
            let raw = raw
                .to_str()
                .map_err(|_| Error::invalid_header("upload-metadata", "not visible ASCII"))?;
            decode_metadata_header(raw)
        }
        None => Ok(Metadata::new()),
    }
}
