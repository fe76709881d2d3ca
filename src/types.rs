//! Core type definitions and aliases used throughout the service.
//!
//! This module provides the fundamental type aliases that standardize request,
//! response, and error types across the request core. Requests arrive with
//! their body already buffered (the ingestion path needs the exact body bytes
//! for signature verification, and badge responses are always small JSON), so
//! both sides of the pipeline work with fully materialized bytes.

use bytes::Bytes;
use http_body_util::Full;

/// HTTP request type with a fully buffered body.
///
/// The server loop collects the body before dispatch so that signature
/// verification and response shaping always see the exact payload bytes.
pub type Request = http::Request<Bytes>;

/// HTTP response type with a buffered JSON (or empty) body.
pub type Response = http::Response<Full<Bytes>>;

/// Boxed error type for thread-safe error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
