use thiserror::Error;

use crate::azure::ArmError;
use crate::config::ConfigError;
use crate::resource::ResourceError;
use crate::terraform::StateError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("cannot import {resource_type} {id:?}: the remote object does not exist")]
    ImportNotFound { resource_type: String, id: String },

    #[error("no resource {0} in state")]
    NotInState(String),

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("parsing attributes from {path}: {source}")]
    Attributes {
        path: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Arm(#[from] ArmError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
