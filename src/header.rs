//! Protocol header codec.
//!
//! Offsets and lengths are plain decimal integers. `upload-metadata` is a
//! comma separated list of `key base64value` pairs, for example
//! `filename d29ybGRfZG9taW5hdGlvbl9wbGFuLnBkZg==,is_confidential`.

use std::collections::BTreeMap;

use axum::http::{HeaderName, HeaderValue};
use axum_extra::headers::{self, Header};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::Error;

/// Protocol version implemented by this crate.
pub const TUS_VERSION: &str = "1.0.0";

/// Extensions advertised on OPTIONS.
pub const TUS_EXTENSIONS: &str = "creation, termination";

/// Content type every PATCH body must declare.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

pub static TUS_RESUMABLE: HeaderName = HeaderName::from_static("tus-resumable");
pub static TUS_VERSION_HEADER: HeaderName = HeaderName::from_static("tus-version");
pub static TUS_EXTENSION: HeaderName = HeaderName::from_static("tus-extension");
pub static UPLOAD_OFFSET: HeaderName = HeaderName::from_static("upload-offset");
pub static UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");
pub static UPLOAD_METADATA: HeaderName = HeaderName::from_static("upload-metadata");
pub static UPLOAD_DEFER_LENGTH: HeaderName = HeaderName::from_static("upload-defer-length");
pub static X_HTTP_METHOD_OVERRIDE: HeaderName = HeaderName::from_static("x-http-method-override");

/// Upload metadata, keys kept in ascending order.
pub type Metadata = BTreeMap<String, Vec<u8>>;

/// Parses `upload-offset`.
pub fn parse_offset_header(raw: Option<&HeaderValue>) -> Result<u64, Error> {
    parse_integer("upload-offset", raw)
}

/// Parses `upload-length`.
pub fn parse_length_header(raw: Option<&HeaderValue>) -> Result<u64, Error> {
    parse_integer("upload-length", raw)
}

fn parse_integer(name: &'static str, raw: Option<&HeaderValue>) -> Result<u64, Error> {
    let raw = raw.ok_or_else(|| Error::invalid_header(name, "missing"))?;
    decode_integer(raw.as_bytes()).ok_or_else(|| {
        Error::invalid_header(name, format!("{:?} is not a non-negative integer", raw))
    })
}

// `u64::from_str` would accept a leading `+`, so digits are checked first.
fn decode_integer(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Decodes an `upload-metadata` header value.
///
/// A pair without a value decodes to an empty value. Repeated keys are
/// last-wins. Any malformed pair, including a key that is not visible
/// ASCII or contains `,`, rejects the whole header.
pub fn decode_metadata_header(raw: &str) -> Result<Metadata, Error> {
    let mut metadata = Metadata::new();

    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let mut tokens = pair.split_whitespace();
        let key = match tokens.next() {
            Some(key) => key,
            None => continue,
        };
        if !valid_metadata_key(key) {
            return Err(Error::invalid_header("upload-metadata", format!("invalid key {:?}", key)));
        }
        let value = match tokens.next() {
            Some(encoded) => STANDARD.decode(encoded).map_err(|e| {
                Error::invalid_header("upload-metadata", format!("value of {:?}: {}", key, e))
            })?,
            None => Vec::new(),
        };
        if tokens.next().is_some() {
            return Err(Error::invalid_header(
                "upload-metadata",
                format!("pair {:?} has more than two tokens", pair),
            ));
        }
        metadata.insert(key.to_string(), value);
    }

    Ok(metadata)
}

/// Encodes metadata for the `upload-metadata` header, keys in ascending order.
///
/// Pairs whose key cannot be decoded again are skipped with a warning.
pub fn encode_metadata_header(metadata: &Metadata) -> String {
    metadata
        .iter()
        .filter(|(key, _)| {
            let valid = valid_metadata_key(key);
            if !valid {
                tracing::warn!(key = ?key, "skipping upload metadata with an invalid key");
            }
            valid
        })
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{} {}", key, STANDARD.encode(value))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// Keys are visible ASCII other than the pair separator.
fn valid_metadata_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_graphic() && b != b',')
}

/// `tus-resumable: 1.0.0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TusResumable;

/// `tus-version: 1.0.0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TusVersion;

/// `tus-extension: creation, termination`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TusExtension;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOffset(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLength(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata(pub Metadata);

macro_rules! fixed_header {
    ($ty:ident, $name:ident, $value:expr) => {
        impl Header for $ty {
            fn name() -> &'static HeaderName {
                &$name
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                values.next().map(|_| $ty).ok_or_else(headers::Error::invalid)
            }

            fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
                values.extend(std::iter::once(HeaderValue::from_static($value)));
            }
        }
    };
}

fixed_header!(TusResumable, TUS_RESUMABLE, TUS_VERSION);
fixed_header!(TusVersion, TUS_VERSION_HEADER, TUS_VERSION);
fixed_header!(TusExtension, TUS_EXTENSION, TUS_EXTENSIONS);

macro_rules! integer_header {
    ($ty:ident, $name:ident) => {
        impl Header for $ty {
            fn name() -> &'static HeaderName {
                &$name
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                values
                    .next()
                    .and_then(|value| decode_integer(value.as_bytes()))
                    .map($ty)
                    .ok_or_else(headers::Error::invalid)
            }

            fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
                values.extend(std::iter::once(HeaderValue::from(self.0)));
            }
        }
    };
}

integer_header!(UploadOffset, UPLOAD_OFFSET);
integer_header!(UploadLength, UPLOAD_LENGTH);

impl Header for UploadMetadata {
    fn name() -> &'static HeaderName {
        &UPLOAD_METADATA
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let raw = value.to_str().map_err(|_| headers::Error::invalid())?;
        decode_metadata_header(raw).map(UploadMetadata).map_err(|_| headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&encode_metadata_header(&self.0)) {
            values.extend(std::iter::once(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderMap;
    use axum_extra::headers::HeaderMapExt;

    fn value(raw: &'static str) -> HeaderValue {
        HeaderValue::from_static(raw)
    }

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.as_bytes().to_vec())).collect()
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(0, parse_offset_header(Some(&value("0"))).unwrap());
        assert_eq!(100, parse_offset_header(Some(&value("100"))).unwrap());
        assert_eq!(u64::MAX, parse_offset_header(Some(&value("18446744073709551615"))).unwrap());
    }

    #[test]
    fn test_parse_offset_rejects_malformed() {
        for raw in ["", "-1", "+1", "1.5", "abc", " 1", "18446744073709551616"] {
            let raw = HeaderValue::from_str(raw).unwrap();
            assert_matches!(
                parse_offset_header(Some(&raw)),
                Err(Error::InvalidHeader { name: "upload-offset", .. })
            );
        }
    }

    #[test]
    fn test_parse_missing() {
        assert_matches!(parse_offset_header(None), Err(Error::InvalidHeader { name: "upload-offset", .. }));
        assert_matches!(parse_length_header(None), Err(Error::InvalidHeader { name: "upload-length", .. }));
    }

    #[test]
    fn test_decode_metadata() {
        let decoded = decode_metadata_header("foo YmFy, baz cXV4").unwrap();
        assert_eq!(metadata(&[("baz", "qux"), ("foo", "bar")]), decoded);
    }

    #[test]
    fn test_decode_metadata_key_only_and_empty_items() {
        let decoded = decode_metadata_header("is_confidential,, filename d29ybGQ=,").unwrap();
        assert_eq!(metadata(&[("filename", "world"), ("is_confidential", "")]), decoded);
        assert!(decode_metadata_header("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_metadata_last_wins() {
        let decoded = decode_metadata_header("foo YmFy,foo cXV4").unwrap();
        assert_eq!(metadata(&[("foo", "qux")]), decoded);
    }

    #[test]
    fn test_decode_metadata_rejects_malformed() {
        assert_matches!(decode_metadata_header("foo !!!"), Err(Error::InvalidHeader { .. }));
        assert_matches!(decode_metadata_header("foo YmFy extra"), Err(Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_decode_metadata_rejects_bad_keys() {
        for raw in ["a\u{7f}b YmFy", "f\u{e9}e YmFy", "a\u{1}b YmFy"] {
            assert_matches!(
                decode_metadata_header(raw),
                Err(Error::InvalidHeader { name: "upload-metadata", .. })
            );
        }
    }

    #[test]
    fn test_encode_metadata_skips_bad_keys() {
        let encoded = encode_metadata_header(&metadata(&[
            ("", "bar"),
            ("a b", "x"),
            ("a\nb", "x"),
            ("a,b", "x"),
            ("foo", "bar"),
        ]));
        assert_eq!("foo YmFy", encoded);
        assert_eq!(metadata(&[("foo", "bar")]), decode_metadata_header(&encoded).unwrap());
    }

    #[test]
    fn test_encode_metadata_sorted() {
        let encoded = encode_metadata_header(&metadata(&[("foo", "bar"), ("baz", "qux")]));
        assert_eq!("baz cXV4, foo YmFy", encoded);
    }

    #[test]
    fn test_metadata_round_trip_binary() {
        let mut original = metadata(&[("empty", ""), ("name", "a b,c")]);
        original.insert("blob".to_string(), vec![0, 255, 10, 13, 44, 32]);
        assert_eq!(original, decode_metadata_header(&encode_metadata_header(&original)).unwrap());
    }

    #[test]
    fn test_typed_headers() {
        let mut headers = HeaderMap::new();
        headers.typed_insert(UploadOffset(50));
        headers.typed_insert(UploadLength(100));
        headers.typed_insert(TusResumable);
        headers.typed_insert(UploadMetadata(metadata(&[("foo", "bar")])));

        assert_eq!("50", headers["upload-offset"]);
        assert_eq!("100", headers["upload-length"]);
        assert_eq!("1.0.0", headers["tus-resumable"]);
        assert_eq!("foo YmFy", headers["upload-metadata"]);
        assert_eq!(Some(UploadOffset(50)), headers.typed_get::<UploadOffset>());
    }

    #[test]
    fn test_typed_metadata_keeps_valid_pairs() {
        let mut headers = HeaderMap::new();
        headers.typed_insert(UploadMetadata(metadata(&[("a\nb", "x"), ("foo", "bar")])));
        assert_eq!("foo YmFy", headers["upload-metadata"]);

        headers.typed_insert(UploadMetadata(Metadata::new()));
        assert_eq!("", headers["upload-metadata"]);
    }
}
