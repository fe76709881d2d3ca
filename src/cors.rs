//! Cross-Origin Resource Sharing: preflight derivation and response decoration.
//!
//! Preflight responses are derived from the route table rather than a static
//! method list, so `Access-Control-Allow-Methods` always reflects what the
//! resolver would actually accept for the path. Two modes are supported:
//! `public` (wildcard origin, no credentials) and `credentialed` (exact
//! origin echo, `Access-Control-Allow-Credentials`, `Vary: Origin`).

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, VARY,
};
use http::{HeaderValue, StatusCode};
use http_body_util::Full;

use crate::router::RouteTable;
use crate::types::Response;

/// Request headers a preflight may approve, all lowercase.
const ALLOWED_REQUEST_HEADERS: &[&str] = &[
    "content-type",
    "authorization",
    "x-signature",
    "x-repo-secret",
    "x-timestamp",
    "x-nonce",
];

/// Credential handling mode for the CORS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsMode {
    /// No credentials; `Access-Control-Allow-Origin: *` is permitted.
    Public,
    /// Credentials allowed; the exact origin must be echoed.
    Credentialed,
}

/// CORS policy configuration.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    mode: CorsMode,
    /// Allowed origins. Empty means "any" in public mode and "none" in
    /// credentialed mode.
    origins: Vec<String>,
    max_age_secs: u32,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            mode: CorsMode::Public,
            origins: Vec::new(),
            max_age_secs: 3600,
        }
    }
}

impl CorsPolicy {
    pub fn new(mode: CorsMode, origins: Vec<String>) -> Self {
        Self {
            mode,
            origins,
            max_age_secs: 3600,
        }
    }

    pub fn max_age_secs(mut self, secs: u32) -> Self {
        self.max_age_secs = secs;
        self
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o.eq_ignore_ascii_case(origin))
    }

    /// The `Access-Control-Allow-Origin` value for a request origin, along
    /// with whether the response now varies on `Origin`.
    fn allow_origin(&self, origin: Option<&str>) -> (Option<String>, bool) {
        match self.mode {
            CorsMode::Public => {
                if self.origins.is_empty() {
                    (Some("*".to_string()), false)
                } else {
                    match origin {
                        Some(o) if self.origin_allowed(o) => (Some(o.to_string()), true),
                        _ => (None, true),
                    }
                }
            }
            CorsMode::Credentialed => match origin {
                Some(o) if self.origin_allowed(o) => (Some(o.to_string()), true),
                _ => (None, true),
            },
        }
    }

    /// Answers an `OPTIONS` preflight for `path`.
    ///
    /// The method set comes from the route table. When the requested method
    /// is part of that set only it is advertised; otherwise the full set is.
    /// Requested headers are echoed back filtered through the whitelist.
    pub fn preflight(
        &self,
        routes: &RouteTable,
        path: &str,
        origin: Option<&str>,
        requested_method: Option<&str>,
        requested_headers: Option<&str>,
    ) -> Response {
        let allowed = routes.allowed_methods(path);
        let mut vary: Vec<&str> = Vec::new();

        let mut builder = http::Response::builder().status(StatusCode::NO_CONTENT);

        let (allow_origin, varies_on_origin) = self.allow_origin(origin);
        if varies_on_origin {
            vary.push("Origin");
        }
        if let Some(value) = allow_origin {
            if let Ok(value) = HeaderValue::from_str(&value) {
                builder = builder.header(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            if self.mode == CorsMode::Credentialed {
                builder = builder
                    .header(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
        }

        let narrowed = requested_method.and_then(|requested| {
            allowed
                .iter()
                .find(|m| m.as_str().eq_ignore_ascii_case(requested.trim()))
        });
        let methods_value = match narrowed {
            Some(method) => method.as_str().to_string(),
            None => allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        };
        if let Ok(value) = HeaderValue::from_str(&methods_value) {
            builder = builder.header(ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        vary.push("Access-Control-Request-Method");

        if let Some(requested) = requested_headers {
            let approved = requested
                .split(',')
                .map(str::trim)
                .filter(|h| {
                    ALLOWED_REQUEST_HEADERS
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(h))
                })
                .collect::<Vec<_>>()
                .join(", ");
            if !approved.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&approved) {
                    builder = builder.header(ACCESS_CONTROL_ALLOW_HEADERS, value);
                }
            }
            vary.push("Access-Control-Request-Headers");
        }

        builder = builder.header(ACCESS_CONTROL_MAX_AGE, self.max_age_secs);
        if let Ok(value) = HeaderValue::from_str(&vary.join(", ")) {
            builder = builder.header(VARY, value);
        }

        builder
            .body(Full::new(bytes::Bytes::new()))
            .unwrap_or_else(|_| {
                let mut fallback = http::Response::new(Full::new(bytes::Bytes::new()));
                *fallback.status_mut() = StatusCode::NO_CONTENT;
                fallback
            })
    }

    /// Decorates a non-preflight response with the origin headers.
    pub fn apply(&self, origin: Option<&str>, response: &mut Response) {
        let (allow_origin, varies_on_origin) = self.allow_origin(origin);
        if let Some(value) = allow_origin {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response
                    .headers_mut()
                    .insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            if self.mode == CorsMode::Credentialed {
                response.headers_mut().insert(
                    ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }
        }
        if varies_on_origin {
            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static("Origin"));
        }
    }
}
