//! Generic ARM path splitting for ids whose kind is not known up front.

use crate::error::{ParseError, Result};

/// A well-formed ARM path split into `(key, value)` pairs.
///
/// `providers` is special-cased: its value is the namespace, and the pairs
/// after it describe the typed resource chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmPath {
    pairs: Vec<(String, String)>,
}

impl ArmPath {
    /// Split an id of any kind.
    ///
    /// The path must be absolute, start with `subscriptions/{id}` and have an
    /// even number of non-empty segments.
    pub fn parse(input: &str) -> Result<Self> {
        const KIND: &str = "Resource";

        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(ParseError::NotAbsolute {
                kind: KIND.to_string(),
                input: input.to_string(),
            });
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let components: Vec<&str> = rest.split('/').collect();

        if let Some(empty_at) = components.iter().position(|c| c.is_empty()) {
            let segment = if empty_at % 2 == 0 {
                "{key}".to_string()
            } else {
                format!("{{{}}}", components[empty_at - 1])
            };
            return Err(ParseError::MissingSegment {
                kind: KIND.to_string(),
                input: input.to_string(),
                segment,
            });
        }
        if components.len() % 2 != 0 {
            let last = components.last().copied().unwrap_or_default();
            return Err(ParseError::MissingSegment {
                kind: KIND.to_string(),
                input: input.to_string(),
                segment: format!("{{{last}}}"),
            });
        }
        if !components[0].eq_ignore_ascii_case("subscriptions") {
            return Err(ParseError::UnexpectedSegment {
                kind: KIND.to_string(),
                input: input.to_string(),
                expected: Some("subscriptions".to_string()),
                found: components[0].to_string(),
            });
        }

        let pairs = components
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        Ok(Self { pairs })
    }

    /// Value of the first pair whose key matches case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The subscription id.
    pub fn subscription_id(&self) -> Option<&str> {
        self.get("subscriptions")
    }

    /// The resource group name, if the id is group-scoped.
    pub fn resource_group(&self) -> Option<&str> {
        self.get("resourceGroups")
    }

    /// The provider namespace of the innermost `providers` segment.
    pub fn provider(&self) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case("providers"))
            .map(|(_, v)| v.as_str())
    }

    /// Fully qualified type of the addressed resource, such as
    /// `Microsoft.Network/virtualNetworks` or
    /// `Microsoft.ApiManagement/service/workspaces`.
    pub fn resource_type(&self) -> Option<String> {
        let idx = self
            .pairs
            .iter()
            .rposition(|(k, _)| k.eq_ignore_ascii_case("providers"))?;
        let mut parts = vec![self.pairs[idx].1.clone()];
        parts.extend(self.pairs[idx + 1..].iter().map(|(k, _)| k.clone()));
        if parts.len() == 1 {
            return None;
        }
        Some(parts.join("/"))
    }

    /// The last value in the path.
    pub fn name(&self) -> &str {
        self.pairs.last().map(|(_, v)| v.as_str()).unwrap_or("")
    }

    /// All pairs, in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network_id() {
        let path = ArmPath::parse(
            "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1",
        )
        .unwrap();
        assert_eq!(path.subscription_id(), Some("s1"));
        assert_eq!(path.resource_group(), Some("rg"));
        assert_eq!(path.provider(), Some("Microsoft.Network"));
        assert_eq!(
            path.resource_type().as_deref(),
            Some("Microsoft.Network/virtualNetworks")
        );
        assert_eq!(path.name(), "vnet1");
    }

    #[test]
    fn test_nested_provider_scope() {
        let path = ArmPath::parse(
            "/subscriptions/s1/providers/Microsoft.Compute/locations/eastus/providers/Microsoft.Quota/quotas/standardDSv3Family",
        )
        .unwrap();
        assert_eq!(path.provider(), Some("Microsoft.Quota"));
        assert_eq!(
            path.resource_type().as_deref(),
            Some("Microsoft.Quota/quotas")
        );
        assert_eq!(path.get("locations"), Some("eastus"));
    }

    #[test]
    fn test_rejects_odd_segments() {
        assert!(ArmPath::parse("/subscriptions/s1/resourceGroups").is_err());
    }

    #[test]
    fn test_rejects_non_subscription_root() {
        assert!(ArmPath::parse("/tenants/t1").is_err());
        assert!(ArmPath::parse("subscriptions/s1").is_err());
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(ArmPath::parse("/subscriptions//resourceGroups/rg").is_err());
    }

    #[test]
    fn test_provider_without_type() {
        let path = ArmPath::parse("/subscriptions/s1/providers/Microsoft.Compute").unwrap();
        assert_eq!(path.resource_type(), None);
    }
}
