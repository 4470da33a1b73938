//! Id patterns and typed resource ids.

use crate::error::{ParseError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One element of an id pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A literal path element such as `resourceGroups` or
    /// `Microsoft.ApiManagement`. Parsing matches it case-insensitively;
    /// formatting emits it exactly as written here.
    Static(&'static str),
    /// A user-supplied value, looked up by this name.
    Value(&'static str),
}

impl Segment {
    fn describe(&self) -> String {
        match self {
            Segment::Static(lit) => (*lit).to_string(),
            Segment::Value(name) => format!("{{{name}}}"),
        }
    }
}

/// The shape of one kind of resource id.
#[derive(Debug)]
pub struct IdPattern {
    name: &'static str,
    segments: &'static [Segment],
    parent: Option<&'static IdPattern>,
}

impl IdPattern {
    /// Declare a pattern with no parent.
    pub const fn new(name: &'static str, segments: &'static [Segment]) -> Self {
        Self {
            name,
            segments,
            parent: None,
        }
    }

    /// Declare a pattern whose leading segments are exactly `parent`'s.
    pub const fn child_of(
        name: &'static str,
        parent: &'static IdPattern,
        segments: &'static [Segment],
    ) -> Self {
        Self {
            name,
            segments,
            parent: Some(parent),
        }
    }

    /// Human-readable kind name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All segments, in order.
    pub fn segments(&self) -> &'static [Segment] {
        self.segments
    }

    /// Pattern of the parent resource, if any.
    pub fn parent(&self) -> Option<&'static IdPattern> {
        self.parent
    }

    /// Names of the value segments, in order.
    pub fn value_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Value(name) => Some(*name),
            Segment::Static(_) => None,
        })
    }

    /// Number of value segments.
    pub fn value_count(&self) -> usize {
        self.value_names().count()
    }

    /// An example id string, e.g. for error messages:
    /// `/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}/...`.
    pub fn example(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("/{}", s.describe()))
            .collect()
    }
}

/// A parsed or constructed resource id.
///
/// Holds the pattern it was built from and the ordered
/// `(segment name, value)` pairs of its value segments.
#[derive(Debug, Clone)]
pub struct ResourceId {
    pattern: &'static IdPattern,
    values: Vec<(&'static str, String)>,
}

impl ResourceId {
    /// Build an id from its values, in pattern order.
    pub fn new(pattern: &'static IdPattern, values: &[&str]) -> Result<Self> {
        let expected = pattern.value_count();
        if values.len() != expected {
            return Err(ParseError::ValueCount {
                kind: pattern.name.to_string(),
                expected,
                found: values.len(),
            });
        }

        let mut pairs = Vec::with_capacity(expected);
        for (name, value) in pattern.value_names().zip(values) {
            if value.is_empty() || value.contains('/') {
                return Err(ParseError::InvalidValue {
                    kind: pattern.name.to_string(),
                    segment: name.to_string(),
                    value: (*value).to_string(),
                });
            }
            pairs.push((name, (*value).to_string()));
        }

        Ok(Self {
            pattern,
            values: pairs,
        })
    }

    /// Parse an id string against a pattern.
    ///
    /// Static segments match case-insensitively; values keep their case. The
    /// input must contain every segment of the pattern and nothing else.
    pub fn parse(pattern: &'static IdPattern, input: &str) -> Result<Self> {
        let kind = pattern.name;
        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(ParseError::NotAbsolute {
                kind: kind.to_string(),
                input: input.to_string(),
            });
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let mut components = rest.split('/');

        let mut values = Vec::with_capacity(pattern.value_count());
        for segment in pattern.segments {
            let component = match components.next() {
                Some(c) if !c.is_empty() => c,
                _ => {
                    return Err(ParseError::MissingSegment {
                        kind: kind.to_string(),
                        input: input.to_string(),
                        segment: segment.describe(),
                    });
                }
            };

            match segment {
                Segment::Static(lit) => {
                    if !component.eq_ignore_ascii_case(lit) {
                        return Err(ParseError::UnexpectedSegment {
                            kind: kind.to_string(),
                            input: input.to_string(),
                            expected: Some((*lit).to_string()),
                            found: component.to_string(),
                        });
                    }
                }
                Segment::Value(name) => values.push((*name, component.to_string())),
            }
        }

        if let Some(extra) = components.next() {
            return Err(ParseError::UnexpectedSegment {
                kind: kind.to_string(),
                input: input.to_string(),
                expected: None,
                found: extra.to_string(),
            });
        }

        Ok(Self { pattern, values })
    }

    /// The pattern this id was built from.
    pub fn pattern(&self) -> &'static IdPattern {
        self.pattern
    }

    /// Value of a named segment.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The last value segment, conventionally the resource's own name.
    pub fn name(&self) -> &str {
        self.values.last().map(|(_, v)| v.as_str()).unwrap_or("")
    }

    /// The `(segment name, value)` pairs, in order.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }

    /// Derive the parent id by prefix.
    pub fn parent(&self) -> Option<ResourceId> {
        let parent = self.pattern.parent?;
        let count = parent.value_count();
        Some(ResourceId {
            pattern: parent,
            values: self.values.iter().take(count).cloned().collect(),
        })
    }

    /// Derive a child id from this id plus the child's own values.
    pub fn child(&self, pattern: &'static IdPattern, values: &[&str]) -> Result<ResourceId> {
        let is_parent = pattern
            .parent
            .is_some_and(|p| std::ptr::eq(p, self.pattern));
        if !is_parent {
            return Err(ParseError::ParentMismatch {
                child: pattern.name.to_string(),
                parent: self.pattern.name.to_string(),
            });
        }

        let mut all: Vec<&str> = self.values.iter().map(|(_, v)| v.as_str()).collect();
        all.extend_from_slice(values);
        ResourceId::new(pattern, &all)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values = self.values.iter();
        for segment in self.pattern.segments {
            match segment {
                Segment::Static(lit) => write!(f, "/{lit}")?,
                Segment::Value(_) => {
                    let value = values.next().map(|(_, v)| v.as_str()).unwrap_or("");
                    write!(f, "/{value}")?;
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}
