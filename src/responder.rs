//! Response generation utilities and CDN-aware response shaping.
//!
//! This module provides the `Responder` trait plus the shaping functions that
//! every handler result passes through. Shaping is where the cache contract
//! lives: 200s get a strong ETag, a `Cache-Control` policy and `Vary`
//! handling; a matching `If-None-Match` collapses the response to a 304 with
//! identical headers and no body; errors are stamped uncacheable.
//!
//! JSON bodies are serialized exactly once and the ETag is computed over
//! those bytes, so identical inputs always produce identical validators.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{
    CACHE_CONTROL, CONTENT_TYPE, ETAG, LAST_MODIFIED, LOCATION, PRAGMA, VARY,
};
use http::{HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::cache::CacheDirective;
use crate::error::ApiError;
use crate::etag;
use crate::types::Response;

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Trait for converting types into HTTP responses.
pub trait Responder {
    /// Converts the implementing type into an HTTP response.
    fn into_response(self) -> Response;
}

impl Responder for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl Responder for ApiError {
    fn into_response(self) -> Response {
        error(&self)
    }
}

/// Builds a cacheable 200 JSON response, or a 304 when the caller's
/// `If-None-Match` already names the computed ETag.
///
/// Both the 200 and the 304 carry the same `ETag`, `Cache-Control`,
/// `Vary: Accept-Encoding` and (when provided) `Last-Modified` headers; the
/// 304 simply drops the body.
pub fn ok_json<T: Serialize>(
    body: &T,
    cache: CacheDirective,
    last_modified: Option<DateTime<Utc>>,
    if_none_match: Option<&str>,
) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(_) => return error(&ApiError::Internal),
    };
    let tag = etag::strong(&bytes);
    let not_modified = if_none_match
        .map(|header| etag::if_none_match_matches(header, &tag))
        .unwrap_or(false);

    let mut builder = http::Response::builder()
        .status(if not_modified {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::OK
        })
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .header(CACHE_CONTROL, cache.header_value())
        .header(VARY, HeaderValue::from_static("Accept-Encoding"));
    if let Ok(tag) = HeaderValue::from_str(&tag) {
        builder = builder.header(ETAG, tag);
    }
    if let Some(modified) = last_modified {
        if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
            builder = builder.header(LAST_MODIFIED, value);
        }
    }

    let body = if not_modified {
        Full::new(Bytes::new())
    } else {
        Full::new(Bytes::from(bytes))
    };
    builder
        .body(body)
        .unwrap_or_else(|_| fallback_internal())
}

/// Builds a 201 Created response with uncacheable headers.
pub fn created_json<T: Serialize>(body: &T, location: Option<&str>) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(_) => return error(&ApiError::Internal),
    };
    let mut builder = http::Response::builder()
        .status(StatusCode::CREATED)
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .header(CACHE_CONTROL, CacheDirective::no_store().header_value())
        .header(PRAGMA, HeaderValue::from_static("no-cache"));
    if let Some(location) = location {
        if let Ok(value) = HeaderValue::from_str(location) {
            builder = builder.header(LOCATION, value);
        }
    }
    builder
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| fallback_internal())
}

/// Builds the uniform error response for any [`ApiError`].
///
/// Errors are never cacheable, whatever the route's normal cache policy.
pub fn error(err: &ApiError) -> Response {
    let bytes = serde_json::to_vec(&err.body()).unwrap_or_else(|_| b"{}".to_vec());
    http::Response::builder()
        .status(err.status())
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .header(CACHE_CONTROL, CacheDirective::no_store().header_value())
        .header(PRAGMA, HeaderValue::from_static("no-cache"))
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| fallback_internal())
}

/// Builds a 302 redirect, uncacheable unless a policy is supplied.
pub fn redirect(location: &str, cache: Option<CacheDirective>) -> Response {
    let cache = cache.unwrap_or(CacheDirective::no_store());
    let mut builder = http::Response::builder()
        .status(StatusCode::FOUND)
        .header(CACHE_CONTROL, cache.header_value());
    if cache.no_store {
        builder = builder.header(PRAGMA, HeaderValue::from_static("no-cache"));
    }
    if let Ok(value) = HeaderValue::from_str(location) {
        builder = builder.header(LOCATION, value);
    }
    builder
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback_internal())
}

/// Formats a timestamp as an RFC 7231 `Last-Modified` value.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn fallback_internal() -> Response {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
