use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const STATE_VERSION: u32 = 4;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("reading state {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing state {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported state version {0}, expected {STATE_VERSION}")]
    UnsupportedVersion(u32),
}

/// Local state: one entry per managed resource, keyed by `type.name`.
///
/// The `id` of each entry is the ARM resource ID (or composite association
/// ID) and is what later refreshes and imports are matched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub resources: Vec<StateResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl StateResource {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: Vec::new(),
        }
    }
}

impl StateFile {
    /// A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StateError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let state: StateFile = serde_json::from_str(&contents).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if state.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };

        let contents = serde_json::to_string_pretty(self).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, contents + "\n").map_err(io_err)?;

        tracing::debug!(path = %path.display(), resources = self.resources.len(), "state saved");
        Ok(())
    }

    pub fn find(&self, resource_type: &str, name: &str) -> Option<&StateResource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Replaces the entry at the same address, or appends a new one.
    pub fn upsert(&mut self, resource: StateResource) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, resource_type: &str, name: &str) -> Option<StateResource> {
        let index = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(name: &str, id: &str) -> StateResource {
        StateResource {
            resource_type: "azurerm_route".to_string(),
            name: name.to_string(),
            id: id.to_string(),
            attributes: json!({"name": name}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::load(&dir.path().join("missing.tfstate")).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("network.tfstate");

        let mut state = StateFile::default();
        state.upsert(entry("r1", "/subscriptions/sub/routes/r1"));
        state.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["resources"][0]["type"], json!("azurerm_route"));

        assert_eq!(StateFile::load(&path).unwrap(), state);
    }

    #[test]
    fn test_upsert_replaces_same_address() {
        let mut state = StateFile::default();
        state.upsert(entry("r1", "/old"));
        state.upsert(entry("r2", "/other"));
        state.upsert(entry("r1", "/new"));

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.find("azurerm_route", "r1").unwrap().id, "/new");
        assert_eq!(state.resources[0].address(), "azurerm_route.r1");
    }

    #[test]
    fn test_remove() {
        let mut state = StateFile::default();
        state.upsert(entry("r1", "/id"));

        assert_eq!(state.remove("azurerm_route", "r1").unwrap().id, "/id");
        assert!(state.remove("azurerm_route", "r1").is_none());
        assert!(state.find("azurerm_route", "r1").is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.tfstate");
        std::fs::write(&path, r#"{"version": 3, "resources": []}"#).unwrap();

        let err = StateFile::load(&path).unwrap_err();
        assert!(matches!(err, StateError::UnsupportedVersion(3)));
    }
}
