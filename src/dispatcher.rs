//! Request dispatch: route resolution, authentication, handler invocation,
//! and uniform recovery.
//!
//! The dispatcher is the single entry point behind the server loop. Per
//! request it: answers `OPTIONS` straight from the CORS policy, resolves
//! the route (after collapsing duplicate slashes, mirroring what the edge
//! does), runs HMAC validation when the descriptor demands it, invokes the
//! registered handler under the request deadline, and converts every
//! failure (typed, panic, or timeout) into the uniform error shape. CORS
//! response decoration is applied on the way out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::Method;
use http::header::{
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};

use crate::auth::HmacAuthenticator;
use crate::cors::CorsPolicy;
use crate::error::ApiError;
use crate::handlers::{AppContext, HandlerRegistry, RouteRequest};
use crate::responder::Responder;
use crate::route::PatternError;
use crate::router::RouteTable;
use crate::types::{Request, Response};

/// Builds the service's route table.
///
/// Templates are registered most-specific first; the org-scoped package
/// badge must come before the org-less form it overlaps.
pub fn standard_routes() -> Result<RouteTable, PatternError> {
    let mut table = RouteTable::new();
    table.route("health", Method::GET, "/health", false, "health")?;
    table.route(
        "package-badge-org",
        Method::GET,
        "/badges/packages/{provider}/{org}/{package}",
        false,
        "package-badge",
    )?;
    table.route(
        "package-badge",
        Method::GET,
        "/badges/packages/{provider}/{package}",
        false,
        "package-badge",
    )?;
    table.route(
        "test-badge",
        Method::GET,
        "/badges/tests/{platform}/{owner}/{repo}/{*branch}",
        false,
        "test-badge",
    )?;
    table.route(
        "ingest-results",
        Method::POST,
        "/tests/results",
        true,
        "ingest-results",
    )?;
    table.route(
        "test-redirect",
        Method::GET,
        "/redirect/test-results/{platform}/{owner}/{repo}/{*branch}",
        false,
        "test-redirect",
    )?;
    Ok(table)
}

/// Orchestrates one request from resolution to response.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    registry: HandlerRegistry,
    cors: CorsPolicy,
    authenticator: Arc<HmacAuthenticator>,
    context: Arc<AppContext>,
    request_deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTable>,
        registry: HandlerRegistry,
        cors: CorsPolicy,
        authenticator: Arc<HmacAuthenticator>,
        context: Arc<AppContext>,
        request_deadline: Duration,
    ) -> Self {
        Self {
            routes,
            registry,
            cors,
            authenticator,
            context,
            request_deadline,
        }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let origin = header_string(&request, ORIGIN.as_str());

        if request.method() == Method::OPTIONS {
            let requested_method = header_string(&request, ACCESS_CONTROL_REQUEST_METHOD.as_str());
            let requested_headers =
                header_string(&request, ACCESS_CONTROL_REQUEST_HEADERS.as_str());
            let normalized = collapse_duplicate_slashes(request.uri().path());
            let path = normalized.as_deref().unwrap_or_else(|| request.uri().path());
            return self.cors.preflight(
                &self.routes,
                path,
                origin.as_deref(),
                requested_method.as_deref(),
                requested_headers.as_deref(),
            );
        }

        let normalized = collapse_duplicate_slashes(request.uri().path());
        let path = normalized.as_deref().unwrap_or_else(|| request.uri().path());

        let Some(matched) = self.routes.try_resolve(request.method(), path) else {
            tracing::debug!(method = %request.method(), %path, "no route matched");
            return self.finish(origin.as_deref(), ApiError::NotFound.into_response());
        };
        tracing::debug!(route = matched.descriptor.name, %path, "route resolved");

        let auth = if matched.descriptor.requires_auth {
            match self
                .authenticator
                .validate(request.headers(), request.body())
                .await
            {
                Ok(auth) => Some(auth),
                Err(err) => {
                    tracing::debug!(route = matched.descriptor.name, code = err.code(), "authentication failed");
                    return self.finish(origin.as_deref(), err.into_response());
                }
            }
        } else {
            None
        };

        let Some(handler) = self.registry.get(matched.descriptor.handler) else {
            tracing::error!(handler = matched.descriptor.handler, "handler not registered");
            return self.finish(origin.as_deref(), ApiError::Internal.into_response());
        };

        let route_request = RouteRequest::new(request, matched, normalized).with_auth(auth);
        let invocation = handler(route_request, self.context.clone());
        let response = match tokio::time::timeout(
            self.request_deadline,
            AssertUnwindSafe(invocation).catch_unwind(),
        )
        .await
        {
            Err(_) => {
                tracing::warn!("handler exceeded the request deadline");
                ApiError::Unavailable.into_response()
            }
            Ok(Err(_)) => {
                tracing::error!("handler panicked");
                ApiError::Internal.into_response()
            }
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(err))) => err.into_response(),
        };
        self.finish(origin.as_deref(), response)
    }

    fn finish(&self, origin: Option<&str>, mut response: Response) -> Response {
        self.cors.apply(origin, &mut response);
        response
    }
}

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Collapses runs of `/` the way the CDN and gateway already do.
///
/// Returns `None` when the path is already normalized, so the common case
/// stays allocation-free.
fn collapse_duplicate_slashes(path: &str) -> Option<String> {
    if !path.contains("//") {
        return None;
    }
    let mut out = String::with_capacity(path.len());
    let mut previous_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_was_slash {
                continue;
            }
            previous_was_slash = true;
        } else {
            previous_was_slash = false;
        }
        out.push(c);
    }
    Some(out)
}
