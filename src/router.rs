//! Route table construction and request resolution.
//!
//! The table holds every [`RouteDescriptor`] for the process lifetime and
//! resolves `(method, path)` pairs against two indexes: a case-insensitive
//! exact index consulted first, then the compiled templates in registration
//! order. Registration order is the tie-break, so more specific templates
//! must be registered before the patterns they overlap.
//!
//! Resolution is allocation-free apart from the caller-owned capture spans;
//! the exact-index lookup lowercases the path into a small stack buffer.
//!
//! # Examples
//!
//! ```rust
//! use badgesmith::router::RouteTable;
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table
//!     .route("health", Method::GET, "/health", false, "health")
//!     .unwrap();
//! let matched = table.try_resolve(&Method::GET, "/health").unwrap();
//! assert_eq!(matched.descriptor.name, "health");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use crate::route::{PatternError, RouteDescriptor, RouteMatch, RoutePattern, RouteValues};

/// Process-wide route table: exact index plus ordered templates.
#[derive(Debug, Default)]
pub struct RouteTable {
    exact: HashMap<String, Vec<Arc<RouteDescriptor>>>,
    templates: Vec<Arc<RouteDescriptor>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route.
    ///
    /// Exact patterns land in the literal index; templates append to the
    /// ordered list, so register most-specific templates first.
    pub fn route(
        &mut self,
        name: &'static str,
        method: Method,
        pattern: &str,
        requires_auth: bool,
        handler: &'static str,
    ) -> Result<(), PatternError> {
        let pattern = RoutePattern::parse(pattern)?;
        let descriptor = Arc::new(RouteDescriptor {
            name,
            method,
            pattern,
            requires_auth,
            handler,
        });
        match &descriptor.pattern {
            RoutePattern::Exact(literal) => {
                self.exact
                    .entry(literal.to_ascii_lowercase())
                    .or_default()
                    .push(descriptor);
            }
            RoutePattern::Template(_) => self.templates.push(descriptor),
        }
        Ok(())
    }

    /// Resolves `(method, path)` to a route match.
    ///
    /// `HEAD` is answered by the corresponding `GET` route; method
    /// comparison is otherwise case-insensitive. A path that matches a
    /// route's structure under a different method does not resolve, so the
    /// caller answers 404 without disclosing the method set.
    pub fn try_resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let method = normalize_method(method);

        let mut buf: SmallVec<[u8; 128]> = SmallVec::new();
        if let Some(key) = lowercase_key(path, &mut buf) {
            if let Some(descriptors) = self.exact.get(key) {
                for descriptor in descriptors {
                    if method_matches(&descriptor.method, method) {
                        return Some(RouteMatch {
                            descriptor: descriptor.clone(),
                            values: RouteValues::new(),
                        });
                    }
                }
            }
        }

        let mut values = RouteValues::new();
        for descriptor in &self.templates {
            if method_matches(&descriptor.method, method)
                && descriptor.pattern.matches(path, &mut values)
            {
                return Some(RouteMatch {
                    descriptor: descriptor.clone(),
                    values,
                });
            }
        }
        None
    }

    /// Unions the methods of every pattern whose structure matches `path`.
    ///
    /// `OPTIONS` is always present; `HEAD` is advertised exactly when `GET`
    /// is. The list is ordered (discovery order) and duplicate-free.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();

        let mut buf: SmallVec<[u8; 128]> = SmallVec::new();
        if let Some(key) = lowercase_key(path, &mut buf) {
            if let Some(descriptors) = self.exact.get(key) {
                for descriptor in descriptors {
                    push_unique(&mut methods, descriptor.method.clone());
                }
            }
        }
        for descriptor in &self.templates {
            if descriptor.pattern.matches_shape(path) {
                push_unique(&mut methods, descriptor.method.clone());
            }
        }

        if let Some(get_at) = methods.iter().position(|m| *m == Method::GET) {
            if !methods.contains(&Method::HEAD) {
                methods.insert(get_at + 1, Method::HEAD);
            }
        }
        push_unique(&mut methods, Method::OPTIONS);
        methods
    }
}

/// `HEAD` requests are served by their `GET` route.
fn normalize_method(method: &Method) -> &Method {
    if *method == Method::HEAD {
        &Method::GET
    } else {
        method
    }
}

fn method_matches(registered: &Method, requested: &Method) -> bool {
    registered
        .as_str()
        .eq_ignore_ascii_case(requested.as_str())
}

fn push_unique(methods: &mut Vec<Method>, method: Method) {
    if !methods.contains(&method) {
        methods.push(method);
    }
}

/// Lowercases `path` into `buf` for the exact-index lookup.
///
/// ASCII lowercasing preserves UTF-8 validity, so the conversion back to
/// `&str` cannot fail for valid input.
fn lowercase_key<'b>(path: &str, buf: &'b mut SmallVec<[u8; 128]>) -> Option<&'b str> {
    buf.clear();
    buf.extend_from_slice(path.as_bytes());
    buf.make_ascii_lowercase();
    std::str::from_utf8(buf).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table
            .route("health", Method::GET, "/health", false, "health")
            .unwrap();
        table
            .route(
                "package-badge-org",
                Method::GET,
                "/badges/packages/{provider}/{org}/{package}",
                false,
                "package-badge",
            )
            .unwrap();
        table
            .route(
                "package-badge",
                Method::GET,
                "/badges/packages/{provider}/{package}",
                false,
                "package-badge",
            )
            .unwrap();
        table
            .route(
                "ingest-results",
                Method::POST,
                "/tests/results",
                true,
                "ingest-results",
            )
            .unwrap();
        table
    }

    #[test]
    fn exact_routes_resolve_case_insensitively() {
        let table = table();
        assert!(table.try_resolve(&Method::GET, "/HEALTH").is_some());
        assert!(table.try_resolve(&Method::GET, "/health/").is_none());
    }

    #[test]
    fn head_is_served_by_get() {
        let table = table();
        let matched = table.try_resolve(&Method::HEAD, "/health").unwrap();
        assert_eq!(matched.descriptor.name, "health");
    }

    #[test]
    fn wrong_method_does_not_resolve() {
        let table = table();
        assert!(table.try_resolve(&Method::POST, "/health").is_none());
        assert!(table.try_resolve(&Method::GET, "/tests/results").is_none());
    }

    #[test]
    fn more_specific_template_wins_by_registration_order() {
        let table = table();
        let matched = table
            .try_resolve(&Method::GET, "/badges/packages/github/acme/widget")
            .unwrap();
        assert_eq!(matched.descriptor.name, "package-badge-org");
        let matched = table
            .try_resolve(&Method::GET, "/badges/packages/nuget/widget")
            .unwrap();
        assert_eq!(matched.descriptor.name, "package-badge");
    }

    #[test]
    fn resolution_is_deterministic() {
        let table = table();
        for _ in 0..3 {
            let matched = table
                .try_resolve(&Method::GET, "/badges/packages/nuget/widget")
                .unwrap();
            assert_eq!(matched.descriptor.name, "package-badge");
        }
    }

    #[test]
    fn allowed_methods_includes_head_for_get_routes() {
        let table = table();
        assert_eq!(
            table.allowed_methods("/health"),
            vec![Method::GET, Method::HEAD, Method::OPTIONS]
        );
    }

    #[test]
    fn allowed_methods_excludes_head_without_get() {
        let table = table();
        assert_eq!(
            table.allowed_methods("/tests/results"),
            vec![Method::POST, Method::OPTIONS]
        );
    }

    #[test]
    fn allowed_methods_on_unknown_path_is_options_only() {
        let table = table();
        assert_eq!(table.allowed_methods("/nope"), vec![Method::OPTIONS]);
    }

    #[test]
    fn allowed_methods_unions_template_matches() {
        let table = table();
        assert_eq!(
            table.allowed_methods("/badges/packages/nuget/widget"),
            vec![Method::GET, Method::HEAD, Method::OPTIONS]
        );
    }
}
