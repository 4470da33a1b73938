//! Registry of resource kinds.
//!
//! Built once at start-up by appending each module's list of kinds, then
//! read-only.

use crate::error::{Error, Result};
use crate::resource::BoxedKind;
use std::collections::BTreeMap;

/// Collects kinds before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    kinds: Vec<BoxedKind>,
}

impl RegistryBuilder {
    /// Add one kind.
    pub fn register(mut self, kind: BoxedKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Add a module's kinds.
    pub fn extend(mut self, kinds: impl IntoIterator<Item = BoxedKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Freeze the registry.
    ///
    /// Fails on duplicate type names and on schemas with definition errors.
    pub fn build(self) -> Result<Registry> {
        let mut kinds = BTreeMap::new();
        for kind in self.kinds {
            let name = kind.type_name();
            if let Some(violation) = kind.schema().definition_errors().into_iter().next() {
                return Err(Error::Definition {
                    kind: name.to_string(),
                    reason: violation.to_string(),
                });
            }
            if kinds.insert(name, kind).is_some() {
                return Err(Error::Definition {
                    kind: name.to_string(),
                    reason: "registered twice".to_string(),
                });
            }
        }
        log::debug!("registered {} resource kinds", kinds.len());
        Ok(Registry { kinds })
    }
}

/// Read-only map from type name to kind.
pub struct Registry {
    kinds: BTreeMap<&'static str, BoxedKind>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a kind by type name.
    pub fn get(&self, type_name: &str) -> Option<&BoxedKind> {
        self.kinds.get(type_name)
    }

    /// Kinds in type-name order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
