//! Route definition and path pattern matching.
//!
//! This module provides the compiled route pattern model used by the route
//! table. Patterns are either an exact literal path or a template of
//! `/`-aligned segments where `{name}` captures exactly one segment and a
//! terminal `{*name}` captures the remainder of the path, slashes included.
//!
//! Matching records captured values as `(offset, length)` spans into the
//! request path; nothing is copied or decoded until a handler materializes a
//! value, at which point percent-decoding is applied.
//!
//! # Examples
//!
//! ```rust
//! use badgesmith::route::{RoutePattern, RouteValues};
//!
//! let pattern = RoutePattern::parse("/badges/tests/{platform}/{owner}/{repo}/{*branch}").unwrap();
//! let mut values = RouteValues::new();
//! assert!(pattern.matches("/badges/tests/linux/acme/widget/release/v2", &mut values));
//! assert_eq!(values.len(), 4);
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;
use thiserror::Error;

/// One `/`-delimited element of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text, compared case-insensitively.
    Literal(String),
    /// Named capture. A greedy capture consumes the rest of the path and is
    /// only valid in terminal position.
    Param { name: String, greedy: bool },
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Matches one literal path, case-insensitively.
    Exact(String),
    /// Matches segment-by-segment with named captures.
    Template(Vec<Segment>),
}

/// Errors raised while compiling a pattern string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("pattern segment {0:?} is invalid")]
    InvalidSegment(String),
    #[error("greedy parameter must be the last segment")]
    GreedyNotLast,
    #[error("duplicate parameter name {0:?}")]
    DuplicateParam(String),
}

impl RoutePattern {
    /// Compiles a pattern string.
    ///
    /// `{name}` captures a single segment, `{*name}` greedily captures the
    /// remainder. A pattern without captures compiles to [`RoutePattern::Exact`].
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash);
        }
        if !pattern.contains('{') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        for raw in pattern[1..].split('/') {
            if let Some(last) = segments.last() {
                if matches!(last, Segment::Param { greedy: true, .. }) {
                    return Err(PatternError::GreedyNotLast);
                }
            }
            if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                let (name, greedy) = match inner.strip_prefix('*') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                if name.is_empty() {
                    return Err(PatternError::InvalidSegment(raw.to_string()));
                }
                if names.contains(&name) {
                    return Err(PatternError::DuplicateParam(name.to_string()));
                }
                names.push(name);
                segments.push(Segment::Param {
                    name: name.to_string(),
                    greedy,
                });
            } else if raw.is_empty() || raw.contains('{') || raw.contains('}') {
                return Err(PatternError::InvalidSegment(raw.to_string()));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }
        Ok(Self::Template(segments))
    }

    /// Matches `path` against this pattern, recording capture spans.
    ///
    /// Returns false on any structural mismatch; matching never allocates.
    pub fn matches(&self, path: &str, values: &mut RouteValues) -> bool {
        values.clear();
        match self {
            Self::Exact(literal) => path.eq_ignore_ascii_case(literal),
            Self::Template(segments) => match_template(segments, path, values),
        }
    }

    /// True when `path` matches this pattern's structure, captures discarded.
    pub fn matches_shape(&self, path: &str) -> bool {
        let mut scratch = RouteValues::new();
        self.matches(path, &mut scratch)
    }

    /// Position of `name` among this pattern's captures, if present.
    pub(crate) fn param_index(&self, name: &str) -> Option<usize> {
        let Self::Template(segments) = self else {
            return None;
        };
        segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .position(|param| param == name)
    }
}

fn match_template(segments: &[Segment], path: &str, values: &mut RouteValues) -> bool {
    if !path.starts_with('/') || path.len() < 2 {
        return false;
    }

    // Byte offset of the segment currently being consumed.
    let mut offset = 1usize;
    // Whether the previous segment ended at a '/' separator.
    let mut ate_separator = true;

    for segment in segments {
        if let Segment::Param { greedy: true, .. } = segment {
            // Terminal by construction; the capture takes everything left.
            if offset >= path.len() {
                return false;
            }
            values.push(offset, path.len() - offset);
            return true;
        }
        if offset > path.len() {
            // Path ran out of segments before the pattern did.
            return false;
        }
        let remainder = &path[offset..];
        let (slice, next_offset, consumed) = match remainder.find('/') {
            Some(pos) => (&remainder[..pos], offset + pos + 1, true),
            None => (remainder, path.len() + 1, false),
        };
        match segment {
            Segment::Literal(text) => {
                if !slice.eq_ignore_ascii_case(text) {
                    return false;
                }
            }
            Segment::Param { .. } => {
                if slice.is_empty() {
                    return false;
                }
                values.push(offset, slice.len());
            }
        }
        offset = next_offset;
        ate_separator = consumed;
    }

    // The pattern is exhausted; the path must be too, with no trailing '/'.
    !ate_separator
}

/// Captured parameter spans for a single matched request.
///
/// Spans index into the request path and are resolved positionally against
/// the matched pattern's parameter order. Values live only as long as the
/// request path buffer they point into.
#[derive(Debug, Clone, Default)]
pub struct RouteValues {
    spans: SmallVec<[(u32, u32); 4]>,
}

impl RouteValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn clear(&mut self) {
        self.spans.clear();
    }

    fn push(&mut self, offset: usize, len: usize) {
        self.spans.push((offset as u32, len as u32));
    }

    fn span(&self, index: usize) -> Option<(usize, usize)> {
        self.spans
            .get(index)
            .map(|&(offset, len)| (offset as usize, len as usize))
    }
}

/// A route descriptor: the immutable identity of one registered route.
///
/// Descriptors are built once at startup and shared read-only for the
/// process lifetime.
#[derive(Debug)]
pub struct RouteDescriptor {
    /// Human-readable route name, used in logs.
    pub name: &'static str,
    /// HTTP method the route answers. `HEAD` is folded into `GET` upstream.
    pub method: Method,
    /// Compiled matching pattern.
    pub pattern: RoutePattern,
    /// Whether the dispatcher must run HMAC authentication first.
    pub requires_auth: bool,
    /// Identifier resolved against the handler registry.
    pub handler: &'static str,
}

/// A resolved route: descriptor plus the captured parameter spans.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub descriptor: Arc<RouteDescriptor>,
    pub values: RouteValues,
}

impl RouteMatch {
    /// Raw (still percent-encoded) capture for `name`.
    pub fn raw<'p>(&self, path: &'p str, name: &str) -> Option<&'p str> {
        let index = self.descriptor.pattern.param_index(name)?;
        let (offset, len) = self.values.span(index)?;
        path.get(offset..offset + len)
    }

    /// Percent-decoded capture for `name`.
    ///
    /// Borrows from the path when no decoding is needed. A capture whose
    /// decoded form is not valid UTF-8 is returned in its raw encoded form.
    pub fn get<'p>(&self, path: &'p str, name: &str) -> Option<Cow<'p, str>> {
        let raw = self.raw(path, name)?;
        match urlencoding::decode(raw) {
            Ok(decoded) => Some(decoded),
            Err(_) => Some(Cow::Borrowed(raw)),
        }
    }
}
