//! Version parsing, filtering, and selection for package badges.
//!
//! Upstream version lists are filtered through the query comparators
//! (`gt, gte, lt, lte, eq`) plus the `prerelease` switch, then the highest
//! remaining version by semver precedence wins. Comparison itself is
//! delegated to the `semver` crate; this module only adds the leniency real
//! feeds need (leading `v`, NuGet's four-segment versions).

use semver::Version;
use url::form_urlencoded;

use crate::error::ApiError;

/// Stable message when the filter set leaves nothing.
pub const NO_MATCHING_VERSIONS: &str = "no matching versions";

/// Parsed query filters for a package badge request.
#[derive(Debug, Clone, Default)]
pub struct VersionFilters {
    pub gt: Option<Version>,
    pub gte: Option<Version>,
    pub lt: Option<Version>,
    pub lte: Option<Version>,
    pub eq: Option<Version>,
    pub include_prerelease: bool,
}

impl VersionFilters {
    /// Parses filters from a raw query string.
    ///
    /// Unknown parameters are ignored; a comparator that is not valid semver
    /// is a validation error.
    pub fn from_query(query: &str) -> Result<Self, ApiError> {
        let mut filters = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "gt" => Some(&mut filters.gt),
                "gte" => Some(&mut filters.gte),
                "lt" => Some(&mut filters.lt),
                "lte" => Some(&mut filters.lte),
                "eq" => Some(&mut filters.eq),
                "prerelease" => {
                    filters.include_prerelease = matches!(
                        value.as_ref().to_ascii_lowercase().as_str(),
                        "true" | "1" | "yes"
                    );
                    None
                }
                _ => None,
            };
            if let Some(slot) = slot {
                let parsed = parse_lenient(value.as_ref()).ok_or_else(|| {
                    ApiError::validation(
                        format!("Filter '{key}' is not a valid semver version"),
                        "INVALID_FILTER",
                        key.as_ref(),
                    )
                })?;
                *slot = Some(parsed);
            }
        }
        Ok(filters)
    }

    /// Whether `version` passes every configured comparator.
    pub fn matches(&self, version: &Version) -> bool {
        if !self.include_prerelease && !version.pre.is_empty() {
            return false;
        }
        if let Some(bound) = &self.gt {
            if version <= bound {
                return false;
            }
        }
        if let Some(bound) = &self.gte {
            if version < bound {
                return false;
            }
        }
        if let Some(bound) = &self.lt {
            if version >= bound {
                return false;
            }
        }
        if let Some(bound) = &self.lte {
            if version > bound {
                return false;
            }
        }
        if let Some(bound) = &self.eq {
            if version != bound {
                return false;
            }
        }
        true
    }
}

/// Parses a version string the way package feeds actually publish them.
///
/// Accepts a leading `v`/`V` and NuGet's four-segment `a.b.c.d` form (the
/// revision moves into build metadata, which semver precedence ignores).
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }
    four_segment(trimmed).and_then(|mapped| Version::parse(&mapped).ok())
}

/// Maps `a.b.c.d[-pre]` onto `a.b.c[-pre]+d`.
fn four_segment(raw: &str) -> Option<String> {
    let (numbers, pre) = match raw.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (raw, None),
    };
    let parts: Vec<&str> = numbers.split('.').collect();
    if parts.len() != 4 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut mapped = format!("{}.{}.{}", parts[0], parts[1], parts[2]);
    if let Some(pre) = pre {
        mapped.push('-');
        mapped.push_str(pre);
    }
    mapped.push('+');
    mapped.push_str(parts[3]);
    Some(mapped)
}

/// Applies `filters` to `versions` and returns the winner.
///
/// The result keeps the original upstream string (that is what the badge
/// shows) alongside the parsed form. Unparsable entries are skipped.
pub fn select_latest<'a, I>(versions: I, filters: &VersionFilters) -> Option<(String, Version)>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|raw| parse_lenient(raw).map(|parsed| (raw.to_string(), parsed)))
        .filter(|(_, parsed)| filters.matches(parsed))
        .max_by(|(_, a), (_, b)| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(query: &str) -> VersionFilters {
        VersionFilters::from_query(query).unwrap()
    }

    #[test]
    fn prerelease_excluded_by_default() {
        let versions = ["12.0.3", "13.0.1", "14.0.0-preview1"];
        let (raw, _) = select_latest(versions, &VersionFilters::default()).unwrap();
        assert_eq!(raw, "13.0.1");
    }

    #[test]
    fn prerelease_included_on_request() {
        let versions = ["12.0.3", "13.0.1", "14.0.0-preview1"];
        let (raw, _) = select_latest(versions, &filters("prerelease=true")).unwrap();
        assert_eq!(raw, "14.0.0-preview1");
    }

    #[test]
    fn comparators_bound_the_selection() {
        let versions = ["1.0.0", "1.5.0", "2.0.0", "2.5.0"];
        let (raw, _) = select_latest(versions, &filters("lt=2.0.0")).unwrap();
        assert_eq!(raw, "1.5.0");
        let (raw, _) = select_latest(versions, &filters("gte=2.0.0&lte=2.0.0")).unwrap();
        assert_eq!(raw, "2.0.0");
        let (raw, _) = select_latest(versions, &filters("gt=1.0.0&lt=2.5.0")).unwrap();
        assert_eq!(raw, "2.0.0");
        let (raw, _) = select_latest(versions, &filters("eq=1.5.0")).unwrap();
        assert_eq!(raw, "1.5.0");
    }

    #[test]
    fn empty_filter_result_is_none() {
        let versions = ["1.0.0", "1.5.0"];
        assert!(select_latest(versions, &filters("gt=9.0.0")).is_none());
    }

    #[test]
    fn invalid_comparator_is_a_validation_error() {
        let err = VersionFilters::from_query("gt=banana").unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[test]
    fn lenient_parse_accepts_feed_quirks() {
        assert_eq!(parse_lenient("v1.2.3").unwrap(), Version::parse("1.2.3").unwrap());
        let four = parse_lenient("1.2.3.4").unwrap();
        assert_eq!((four.major, four.minor, four.patch), (1, 2, 3));
        assert!(parse_lenient("not-a-version").is_none());
    }

    #[test]
    fn four_segment_versions_compare_by_first_three() {
        let versions = ["1.0.0.9", "1.0.1.0"];
        let (raw, _) = select_latest(versions, &VersionFilters::default()).unwrap();
        assert_eq!(raw, "1.0.1.0");
    }

    #[test]
    fn unparsable_upstream_versions_are_skipped() {
        let versions = ["garbage", "1.0.0"];
        let (raw, _) = select_latest(versions, &VersionFilters::default()).unwrap();
        assert_eq!(raw, "1.0.0");
    }
}
