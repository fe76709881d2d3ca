//! Cache directive modeling and `Cache-Control` rendering.
//!
//! Every response class carries a [`CacheDirective`] describing how the CDN
//! and clients may cache it. Badge responses use a short shared-cache window
//! with stale-while-revalidate / stale-if-error so the edge keeps serving
//! through brief upstream wobble; error responses are never cacheable.

use http::HeaderValue;

/// Per-response-class cache policy.
///
/// Rendered either as the public directive set
/// (`public, s-maxage=…, max-age=…, stale-while-revalidate=…, stale-if-error=…`)
/// or, when `no_store` is set, as the uncacheable triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDirective {
    /// Shared-cache (CDN) lifetime in seconds.
    pub s_max_age: u32,
    /// Browser lifetime in seconds.
    pub max_age: u32,
    /// stale-while-revalidate window in seconds.
    pub swr: u32,
    /// stale-if-error window in seconds.
    pub sie: u32,
    /// When set, the response must not be stored anywhere.
    pub no_store: bool,
}

impl CacheDirective {
    /// Default profile for fresh badge responses.
    pub const fn badge() -> Self {
        Self {
            s_max_age: 10,
            max_age: 5,
            swr: 15,
            sie: 60,
            no_store: false,
        }
    }

    /// Shorter profile for badges served from a stale upstream cache entry.
    pub const fn stale_badge() -> Self {
        Self {
            s_max_age: 5,
            max_age: 5,
            swr: 15,
            sie: 60,
            no_store: false,
        }
    }

    /// Profile for "unavailable" badges while an upstream is down.
    pub const fn unavailable_badge() -> Self {
        Self {
            s_max_age: 60,
            max_age: 60,
            swr: 15,
            sie: 60,
            no_store: false,
        }
    }

    /// Uncacheable responses (errors, ingestion results, health).
    pub const fn no_store() -> Self {
        Self {
            s_max_age: 0,
            max_age: 0,
            swr: 0,
            sie: 0,
            no_store: true,
        }
    }

    /// Short public cache for redirects that opt into caching.
    pub const fn short_redirect() -> Self {
        Self {
            s_max_age: 30,
            max_age: 30,
            swr: 0,
            sie: 0,
            no_store: false,
        }
    }

    /// Renders the `Cache-Control` header value for this directive.
    pub fn header_value(&self) -> HeaderValue {
        if self.no_store {
            return HeaderValue::from_static("no-store, no-cache, must-revalidate");
        }
        let rendered = format!(
            "public, s-maxage={}, max-age={}, stale-while-revalidate={}, stale-if-error={}",
            self.s_max_age, self.max_age, self.swr, self.sie
        );
        // Only ASCII digits and directive tokens, always a valid header value.
        HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_profile_renders_all_directives() {
        assert_eq!(
            CacheDirective::badge().header_value(),
            "public, s-maxage=10, max-age=5, stale-while-revalidate=15, stale-if-error=60"
        );
    }

    #[test]
    fn no_store_renders_the_triple() {
        assert_eq!(
            CacheDirective::no_store().header_value(),
            "no-store, no-cache, must-revalidate"
        );
    }

    #[test]
    fn unavailable_profile_caps_at_a_minute() {
        let v = CacheDirective::unavailable_badge().header_value();
        assert!(v.to_str().unwrap().contains("max-age=60"));
    }
}
