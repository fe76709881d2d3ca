//! Shields.io-compatible badge JSON model.
//!
//! The badge schema is consumed by image renderers; field order is part of
//! the wire contract because ETags are computed over the serialized bytes.
//! Serde serializes struct fields in declaration order, which keeps the
//! output deterministic across runs.

use serde::Serialize;

/// Badge payload in the Shields `schemaVersion: 1` JSON schema.
///
/// # Examples
///
/// ```rust
/// use badgesmith::badge::Badge;
///
/// let badge = Badge::package_version("nuget", "13.0.1", Some("nuget"));
/// let json = serde_json::to_string(&badge).unwrap();
/// assert!(json.starts_with(r#"{"schemaVersion":1,"label":"nuget""#));
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub schema_version: u32,
    pub label: String,
    pub message: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_seconds: Option<u32>,
}

impl Badge {
    fn new(label: impl Into<String>, message: impl Into<String>, color: &str) -> Self {
        Self {
            schema_version: 1,
            label: label.into(),
            message: message.into(),
            color: color.to_string(),
            named_logo: None,
            cache_seconds: None,
        }
    }

    /// Successful package-version badge, e.g. `nuget | 13.0.1`.
    pub fn package_version(label: &str, version: &str, logo: Option<&str>) -> Self {
        let mut badge = Self::new(label, version, "blue");
        badge.named_logo = logo.map(str::to_string);
        badge
    }

    /// Badge body when a package or version set has no match.
    pub fn not_found(label: &str, message: &str) -> Self {
        Self::new(label, message, "red")
    }

    /// Badge body when the upstream cannot be reached and no cache exists.
    pub fn unavailable(label: &str) -> Self {
        let mut badge = Self::new(label, "unavailable", "lightgray");
        badge.cache_seconds = Some(60);
        badge
    }

    /// Test-result badge: green on a clean run, red when anything failed.
    pub fn test_results(passed: u32, failed: u32, total: u32) -> Self {
        let color = if failed == 0 { "green" } else { "red" };
        Self::new("tests", format!("{passed}/{total} passed"), color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_badge_matches_the_wire_shape() {
        let badge = Badge::package_version("nuget", "13.0.1", Some("nuget"));
        let json = serde_json::to_string(&badge).unwrap();
        assert_eq!(
            json,
            r#"{"schemaVersion":1,"label":"nuget","message":"13.0.1","color":"blue","namedLogo":"nuget"}"#
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let badge = Badge::not_found("nuget", "not found");
        let json = serde_json::to_string(&badge).unwrap();
        assert!(!json.contains("namedLogo"));
        assert!(!json.contains("cacheSeconds"));
    }

    #[test]
    fn failing_tests_turn_red() {
        let badge = Badge::test_results(9, 1, 10);
        assert_eq!(badge.color, "red");
        assert_eq!(badge.message, "9/10 passed");
        assert_eq!(Badge::test_results(10, 0, 10).color, "green");
    }
}
