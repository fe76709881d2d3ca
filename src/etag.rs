//! Strong ETag computation and `If-None-Match` evaluation.
//!
//! ETags are computed over the exact serialized response bytes so that a
//! byte-identical body always yields the same validator across processes and
//! runs. The comparison side accepts the full `If-None-Match` grammar used by
//! CDNs: a comma-separated list, optional `W/` weak prefixes (stripped for
//! comparison), and the `*` wildcard.
//!
//! # Examples
//!
//! ```rust
//! use badgesmith::etag;
//!
//! let tag = etag::strong(b"{\"ok\":true}");
//! assert!(tag.starts_with('"') && tag.ends_with('"'));
//! assert!(etag::if_none_match_matches(&tag, &tag));
//! assert!(etag::if_none_match_matches("*", &tag));
//! ```

use sha2::{Digest, Sha256};

/// Computes the strong, quoted ETag for a response body.
///
/// The value is the fixed-width lowercase hex of SHA-256 over `body`,
/// wrapped in double quotes.
pub fn strong(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(digest))
}

/// Returns true when an `If-None-Match` header value matches `etag`.
///
/// `etag` is the quoted strong validator produced by [`strong`]. Candidates
/// are compared case-insensitively on the hex portion; weak prefixes are
/// stripped before comparison and `*` matches unconditionally.
pub fn if_none_match_matches(header: &str, etag: &str) -> bool {
    header.split(',').any(|candidate| {
        let candidate = candidate.trim();
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate.eq_ignore_ascii_case(etag)
    })
}
