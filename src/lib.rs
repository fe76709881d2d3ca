//! Shields-compatible badge service with signed CI result ingestion.
//!
//! BadgeSmith sits behind a CDN and an API gateway and serves deterministic,
//! cacheable badge JSON for package versions and CI test results, plus an
//! HMAC-authenticated ingestion endpoint for those results.
//!
//! # Architecture
//! - [`router`] / [`route`]: zero-allocation route resolution with named
//!   captures and an allowed-methods derivation for preflight.
//! - [`responder`] / [`etag`] / [`cache`]: CDN-aware response shaping with
//!   strong ETags, conditional GET, stale-while-revalidate directives.
//! - [`auth`] / [`store`]: HMAC validation with timestamp skew checks and
//!   nonce replay protection over a TTL store.
//! - [`secrets`]: cached, single-flight secret resolution.
//! - [`providers`]: NuGet and GitHub version lookups with conditional
//!   GETs, bounded retry, circuit breaking, and cache degradation.
//! - [`dispatcher`]: orchestration of resolve, authenticate, invoke, recover.
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let routes = Arc::new(badgesmith::dispatcher::standard_routes()?);
//! # Ok(())
//! # }
//! ```

/// HMAC request authentication with skew and replay protection.
pub mod auth;

/// Shields badge JSON model.
pub mod badge;

/// Cache directive modeling and `Cache-Control` rendering.
pub mod cache;

/// Process configuration (CLI flags with environment fallbacks).
pub mod config;

/// CORS preflight derivation and response decoration.
pub mod cors;

/// Request dispatch and uniform error recovery.
pub mod dispatcher;

/// API error taxonomy and HTTP status mapping.
pub mod error;

/// Strong ETag computation and `If-None-Match` evaluation.
pub mod etag;

/// Request handlers and the handler registry.
pub mod handlers;

/// Upstream package providers (NuGet, GitHub).
pub mod providers;

/// Response shaping and the `Responder` trait.
pub mod responder;

/// Route patterns and matching.
pub mod route;

/// Route table and resolution.
pub mod router;

/// Cached secret resolution.
pub mod secrets;

/// HTTP server loop.
pub mod server;

/// Backing stores: nonces, secret material, test results.
pub mod store;

/// Structured logging setup.
pub mod tracing;

/// Core type aliases.
pub mod types;

/// Version parsing, filtering, and selection.
pub mod version;

pub use bytes::Bytes;
pub use http::{Method, StatusCode, header};
pub use server::serve;
