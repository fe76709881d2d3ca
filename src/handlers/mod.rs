//! Request handlers and the singleton handler registry.
//!
//! Handlers are plain async functions over a [`RouteRequest`] (the request
//! plus its resolved route captures) and the shared [`AppContext`]. They
//! return `Result<Response, ApiError>`; the dispatcher owns the uniform
//! error mapping, CORS decoration, and deadline enforcement.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Uri};

use crate::auth::AuthenticatedRequest;
use crate::error::ApiError;
use crate::providers::ProviderRegistry;
use crate::route::RouteMatch;
use crate::store::results::ResultStore;
use crate::types::{Request, Response};

pub mod health;
pub mod packages;
pub mod test_results;

/// Shared services handed to every handler, wired once at startup.
pub struct AppContext {
    pub providers: ProviderRegistry,
    pub results: Arc<dyn ResultStore>,
    /// TTL for run-seen idempotency markers.
    pub run_marker_ttl: Duration,
}

/// A request paired with its resolved route.
///
/// Parameter access goes through the route captures and decodes lazily; the
/// spans never outlive this envelope.
pub struct RouteRequest {
    request: Request,
    matched: RouteMatch,
    /// Present when the dispatcher collapsed duplicate slashes; the capture
    /// spans index into this string instead of the raw URI path.
    normalized_path: Option<String>,
    auth: Option<AuthenticatedRequest>,
}

impl RouteRequest {
    pub fn new(request: Request, matched: RouteMatch, normalized_path: Option<String>) -> Self {
        Self {
            request,
            matched,
            normalized_path,
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: Option<AuthenticatedRequest>) -> Self {
        self.auth = auth;
        self
    }

    /// The path route captures were matched against.
    pub fn path(&self) -> &str {
        self.normalized_path
            .as_deref()
            .unwrap_or_else(|| self.request.uri().path())
    }

    /// Percent-decoded route capture.
    pub fn param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.matched.get(self.path(), name)
    }

    /// Route capture in its raw, still-encoded form.
    pub fn raw_param(&self, name: &str) -> Option<&str> {
        self.matched.raw(self.path(), name)
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn query(&self) -> &str {
        self.request.uri().query().unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// A request header as a string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Identity attached by the HMAC authenticator, on protected routes.
    pub fn auth(&self) -> Option<&AuthenticatedRequest> {
        self.auth.as_ref()
    }

    pub fn route_name(&self) -> &'static str {
        self.matched.descriptor.name
    }
}

/// Type-erased handler stored in the registry.
pub type BoxHandler =
    Arc<dyn Fn(RouteRequest, Arc<AppContext>) -> BoxFuture<'static, Result<Response, ApiError>> + Send + Sync>;

/// Singleton handler registry keyed by the descriptor's handler identifier.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, BoxHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(mut self, id: &'static str, handler: F) -> Self
    where
        F: Fn(RouteRequest, Arc<AppContext>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        let handler: BoxHandler = Arc::new(move |request, context| {
            Box::pin(handler(request, context)) as BoxFuture<'static, Result<Response, ApiError>>
        });
        self.handlers.insert(id, handler);
        self
    }

    pub fn get(&self, id: &str) -> Option<BoxHandler> {
        self.handlers.get(id).cloned()
    }

    /// The full handler set this service ships.
    pub fn standard() -> Self {
        Self::new()
            .register("health", health::health)
            .register("package-badge", packages::package_badge)
            .register("test-badge", test_results::test_badge)
            .register("ingest-results", test_results::ingest)
            .register("test-redirect", test_results::redirect_to_run)
    }
}
