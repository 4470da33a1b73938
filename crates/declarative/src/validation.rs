//! Field validators.
//!
//! Each constructor returns a [`Validator`] that declares the primitive it
//! accepts. Reasons never quote the value being checked.

use crate::schema::{Primitive, Validator};
use regex::Regex;
use resourceid::{ArmPath, IdPattern, ResourceId};
use serde_json::Value;

/// The string must be one of `allowed`.
pub fn string_in_slice(allowed: &'static [&'static str], ignore_case: bool) -> Validator {
    Validator::new("string_in_slice", Primitive::String, move |value| {
        let s = value.as_str().unwrap_or_default();
        let ok = allowed.iter().any(|candidate| {
            if ignore_case {
                candidate.eq_ignore_ascii_case(s)
            } else {
                *candidate == s
            }
        });
        if ok {
            Ok(())
        } else {
            Err(format!("expected one of [{}]", allowed.join(", ")))
        }
    })
}

/// The string must not be empty or whitespace.
pub fn string_is_not_empty() -> Validator {
    Validator::new("string_is_not_empty", Primitive::String, |value| {
        if value.as_str().is_some_and(|s| !s.trim().is_empty()) {
            Ok(())
        } else {
            Err("must not be empty".to_string())
        }
    })
}

/// The string must match `pattern`.
pub fn string_matches(pattern: &'static str, message: &'static str) -> Validator {
    let regex = Regex::new(pattern);
    Validator::new("string_matches", Primitive::String, move |value| {
        let regex = regex
            .as_ref()
            .map_err(|e| format!("invalid validation pattern: {e}"))?;
        if regex.is_match(value.as_str().unwrap_or_default()) {
            Ok(())
        } else {
            Err(message.to_string())
        }
    })
}

/// The string must be an http(s) URL.
pub fn is_url() -> Validator {
    Validator::new("is_url", Primitive::String, |value| {
        let s = value.as_str().unwrap_or_default();
        let rest = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
            _ => Err("expected an http or https URL".to_string()),
        }
    })
}

/// The integer must be at least `min`.
pub fn int_at_least(min: i64) -> Validator {
    Validator::new("int_at_least", Primitive::Int, move |value| match value.as_i64() {
        Some(n) if n >= min => Ok(()),
        _ => Err(format!("must be at least {min}")),
    })
}

/// The integer must be within `min..=max`.
pub fn int_between(min: i64, max: i64) -> Validator {
    Validator::new("int_between", Primitive::Int, move |value| match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(format!("must be between {min} and {max}")),
    })
}

/// The string must parse as an id of `pattern`.
pub fn resource_id(pattern: &'static IdPattern) -> Validator {
    Validator::new("resource_id", Primitive::String, move |value| {
        ResourceId::parse(pattern, value.as_str().unwrap_or_default())
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
}

/// The string must be a well-formed ARM path of any kind.
pub fn arm_id() -> Validator {
    Validator::new("arm_id", Primitive::String, |value: &Value| {
        ArmPath::parse(value.as_str().unwrap_or_default())
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use resourceid::Segment;
    use serde_json::json;

    static RG: IdPattern = IdPattern::new(
        "ResourceGroup",
        &[
            Segment::Static("subscriptions"),
            Segment::Value("subscriptionId"),
            Segment::Static("resourceGroups"),
            Segment::Value("resourceGroupName"),
        ],
    );

    #[test]
    fn test_string_in_slice() {
        let v = string_in_slice(&["Default", "GeoReplica"], false);
        assert!(v.check(&json!("Default")).is_ok());
        assert!(v.check(&json!("default")).is_err());

        let v = string_in_slice(&["Default", "GeoReplica"], true);
        assert!(v.check(&json!("default")).is_ok());
    }

    #[test]
    fn test_string_matches() {
        let v = string_matches("^[a-z0-9-]{3,40}$", "must be 3-40 lowercase letters, digits or hyphens");
        assert!(v.check(&json!("my-cluster")).is_ok());
        assert_eq!(
            v.check(&json!("My_Cluster")).unwrap_err(),
            "must be 3-40 lowercase letters, digits or hyphens"
        );
    }

    #[test]
    fn test_invalid_pattern_reports_instead_of_panicking() {
        let v = string_matches("([", "never");
        assert!(v.check(&json!("x")).unwrap_err().contains("invalid validation pattern"));
    }

    #[test]
    fn test_int_validators() {
        assert!(int_at_least(0).check(&json!(0)).is_ok());
        assert!(int_at_least(0).check(&json!(-1)).is_err());
        assert!(int_between(1, 3).check(&json!(3)).is_ok());
        assert!(int_between(1, 3).check(&json!(4)).is_err());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url().check(&json!("https://example.com/tos")).is_ok());
        assert!(is_url().check(&json!("ftp://example.com")).is_err());
        assert!(is_url().check(&json!("https://")).is_err());
    }

    #[test]
    fn test_id_validators() {
        let v = resource_id(&RG);
        assert!(v.check(&json!("/subscriptions/s1/resourceGroups/rg1")).is_ok());
        assert!(v.check(&json!("/subscriptions/s1")).is_err());

        assert!(arm_id().check(&json!("/subscriptions/s1/resourceGroups/rg1")).is_ok());
        assert!(arm_id().check(&json!("not-an-id")).is_err());
    }
}
