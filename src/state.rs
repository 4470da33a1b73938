use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use declarative::InstanceState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Format version written to new state files.
const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

/// Recorded state of every managed resource, keyed by address.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    pub version: u32,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,

    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,
}

/// State for a single resource
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Remote id
    pub id: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceEntry {
    pub fn instance(&self) -> InstanceState {
        InstanceState::new(self.id.clone(), self.attributes.clone())
    }
}

// ============================================================================
// StateFile Implementation
// ============================================================================

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
            last_updated: None,
        }
    }
}

impl StateFile {
    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            bail!(
                "State file {} has version {}, this build reads up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk, replacing the file atomically
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(&self).context("Failed to serialize state")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&ResourceEntry> {
        self.resources.get(address)
    }

    /// Recorded instance for an address
    pub fn instance(&self, address: &str) -> Option<InstanceState> {
        self.get(address).map(ResourceEntry::instance)
    }

    /// Record the outcome of an operation: `Some` stores, `None` forgets.
    pub fn record(&mut self, address: &str, resource_type: &str, state: Option<InstanceState>) {
        match state {
            Some(state) => {
                self.resources.insert(
                    address.to_string(),
                    ResourceEntry {
                        resource_type: resource_type.to_string(),
                        id: state.id,
                        attributes: state.attributes,
                        updated_at: Utc::now(),
                    },
                );
            }
            None => {
                self.resources.remove(address);
            }
        }
    }

    /// Find the address already tracking a remote id
    pub fn address_of(&self, id: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|(_, entry)| entry.id.eq_ignore_ascii_case(id))
            .map(|(address, _)| address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(id: &str) -> InstanceState {
        let attributes = json!({ "name": "cores", "limit_value": 100 })
            .as_object()
            .cloned()
            .unwrap();
        InstanceState::new(id, attributes)
    }

    #[test]
    fn test_default_state() {
        let state = StateFile::default();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.resources.is_empty());
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn test_record_and_forget() {
        let mut state = StateFile::default();
        state.record("azurerm_quota.cores", "azurerm_quota", Some(instance("/q/1")));

        let entry = state.get("azurerm_quota.cores").unwrap();
        assert_eq!(entry.resource_type, "azurerm_quota");
        assert_eq!(entry.id, "/q/1");
        assert_eq!(state.instance("azurerm_quota.cores").unwrap(), instance("/q/1"));
        assert_eq!(state.address_of("/Q/1"), Some("azurerm_quota.cores"));

        state.record("azurerm_quota.cores", "azurerm_quota", None);
        assert!(state.get("azurerm_quota.cores").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::load(&dir.path().join("armsync.state.json")).unwrap();
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("armsync.state.json");

        let mut state = StateFile::default();
        state.record("azurerm_quota.cores", "azurerm_quota", Some(instance("/q/1")));
        state.save(&path).unwrap();
        assert!(state.last_updated.is_some());
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.instance("azurerm_quota.cores").unwrap(), instance("/q/1"));
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("armsync.state.json");
        fs::write(&path, r#"{ "version": 99, "resources": {}, "last_updated": null }"#).unwrap();

        let err = StateFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }
}
