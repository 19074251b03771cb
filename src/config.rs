use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::Timeouts;

const CONFIG_DIR: &str = "azurerm-network";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Optional provider settings read from a JSON file.
///
/// CLI flags and environment variables win over anything set here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: Option<String>,
    pub subscription_id: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    /// Keyed by resource type, e.g. `azurerm_vpn_gateway`.
    pub timeouts: BTreeMap<String, TimeoutOverrides>,
}

/// Per-operation overrides in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutOverrides {
    pub create: Option<u64>,
    pub read: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

impl ProviderConfig {
    /// `$XDG_CONFIG_HOME/azurerm-network/config.json` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// A missing file yields the default configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_seconds.map(Duration::from_secs)
    }

    /// The resource's own timeouts with any configured overrides applied.
    pub fn timeouts_for(&self, resource_type: &str, base: Timeouts) -> Timeouts {
        let Some(overrides) = self.timeouts.get(resource_type) else {
            return base;
        };
        let minutes = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, |m| Duration::from_secs(m * 60))
        };
        Timeouts {
            create: minutes(overrides.create, base.create),
            read: minutes(overrides.read, base.read),
            update: minutes(overrides.update, base.update),
            delete: minutes(overrides.delete, base.delete),
        }
    }
}
